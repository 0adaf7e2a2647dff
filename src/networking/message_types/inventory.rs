use std::convert::TryFrom;

use crate::block::Block;
use crate::crypto::Blake2bHash;
use crate::serialization::{SerialError, SerialReader};
use crate::transaction::Transaction;

/// Upper bound on the vectors carried by INV / GET_DATA / GET_HEADER /
/// NOT_FOUND. Enforced before allocation on the receive side.
pub const VECTORS_MAX_COUNT: usize = 1000;

/// Upper bound on the block locators in GET_BLOCKS.
pub const LOCATORS_MAX_COUNT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum InvVectorType {
    Error = 0,
    Transaction = 1,
    Block = 2,
}

impl TryFrom<u32> for InvVectorType {
    type Error = SerialError;

    fn try_from(value: u32) -> Result<InvVectorType, SerialError> {
        match value {
            0 => Ok(InvVectorType::Error),
            1 => Ok(InvVectorType::Transaction),
            2 => Ok(InvVectorType::Block),
            _ => Err(SerialError::InvalidValue("inventory vector type")),
        }
    }
}

/// A pointer to an object another peer may want: its kind and its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvVector {
    pub ty: InvVectorType,
    pub hash: Blake2bHash,
}

impl InvVector {
    pub fn from_block(block: &Block) -> InvVector {
        InvVector {
            ty: InvVectorType::Block,
            hash: block.hash(),
        }
    }

    pub fn from_transaction(transaction: &Transaction) -> InvVector {
        InvVector {
            ty: InvVectorType::Transaction,
            hash: transaction.hash(),
        }
    }

    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&(self.ty as u32).to_be_bytes());
        vbytes.extend(&self.hash);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<InvVector, SerialError> {
        Ok(InvVector {
            ty: InvVectorType::try_from(reader.read_u32()?)?,
            hash: reader.read_array()?,
        })
    }
}

/// Serialize a vector list with its u16 count prefix.
pub fn serialize_vectors(vectors: &[InvVector], vbytes: &mut Vec<u8>) {
    vbytes.extend(&(vectors.len() as u16).to_be_bytes());
    for vector in vectors {
        vector.serialize_into(vbytes);
    }
}

pub fn read_vectors(reader: &mut SerialReader<'_>) -> Result<Vec<InvVector>, SerialError> {
    let count = reader.read_u16()? as usize;
    if count > VECTORS_MAX_COUNT {
        return Err(SerialError::TooManyElements(
            "inventory vectors",
            count,
            VECTORS_MAX_COUNT,
        ));
    }
    let mut vectors = Vec::with_capacity(count);
    for _ in 0..count {
        vectors.push(InvVector::read_from(reader)?);
    }
    Ok(vectors)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GetBlocksDirection {
    Forward = 1,
    Backward = 2,
}

impl TryFrom<u8> for GetBlocksDirection {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<GetBlocksDirection, SerialError> {
        match value {
            1 => Ok(GetBlocksDirection::Forward),
            2 => Ok(GetBlocksDirection::Backward),
            _ => Err(SerialError::InvalidValue("get-blocks direction")),
        }
    }
}

/// Ask a peer for inventory starting from the best block we share. The
/// locators walk backwards from our head; the peer answers with an INV.
#[derive(Debug, PartialEq, Clone)]
pub struct GetBlocksMessage {
    pub locators: Vec<Blake2bHash>,
    pub max_inv_size: u16,
    pub direction: GetBlocksDirection,
}

impl GetBlocksMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.push(self.locators.len() as u8);
        for locator in &self.locators {
            vbytes.extend(locator);
        }
        vbytes.extend(&self.max_inv_size.to_be_bytes());
        vbytes.push(self.direction as u8);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<GetBlocksMessage, SerialError> {
        let count = reader.read_u8()? as usize;
        if count > LOCATORS_MAX_COUNT {
            return Err(SerialError::TooManyElements(
                "block locators",
                count,
                LOCATORS_MAX_COUNT,
            ));
        }
        let mut locators = Vec::with_capacity(count);
        for _ in 0..count {
            locators.push(reader.read_array()?);
        }
        Ok(GetBlocksMessage {
            locators,
            max_inv_size: reader.read_u16()?,
            direction: GetBlocksDirection::try_from(reader.read_u8()?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_round_trip() {
        let vectors = vec![
            InvVector {
                ty: InvVectorType::Block,
                hash: [1; 32],
            },
            InvVector {
                ty: InvVectorType::Transaction,
                hash: [2; 32],
            },
        ];
        let mut vbytes = vec![];
        serialize_vectors(&vectors, &mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(read_vectors(&mut reader).unwrap(), vectors);
    }

    #[test]
    fn test_vectors_count_cap() {
        let mut vbytes = vec![];
        vbytes.extend(&(VECTORS_MAX_COUNT as u16 + 1).to_be_bytes());
        let mut reader = SerialReader::new(&vbytes);
        assert!(matches!(
            read_vectors(&mut reader),
            Err(SerialError::TooManyElements(_, _, _))
        ));
    }

    #[test]
    fn test_unknown_vector_type() {
        let mut vbytes = vec![];
        vbytes.extend(&1u16.to_be_bytes());
        vbytes.extend(&9u32.to_be_bytes());
        vbytes.extend(&[0u8; 32]);
        let mut reader = SerialReader::new(&vbytes);
        assert!(read_vectors(&mut reader).is_err());
    }

    #[test]
    fn test_get_blocks_round_trip() {
        let get_blocks = GetBlocksMessage {
            locators: vec![[3; 32], [4; 32]],
            max_inv_size: 500,
            direction: GetBlocksDirection::Backward,
        };
        let mut vbytes = vec![];
        get_blocks.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(GetBlocksMessage::read_from(&mut reader).unwrap(), get_blocks);
    }
}
