use crate::crypto::{hash, Blake2bHash, PublicKey};
use crate::serialization::{SerialError, SerialReader};
use crate::transaction::Transaction;

/// Serialized size of a block header in bytes.
pub const BLOCK_HEADER_SIZE: usize = 122;

/// The proof-of-work header of a block. Fixed layout, all integers
/// big-endian.
#[derive(Debug, PartialEq, Clone)]
pub struct BlockHeader {
    pub version: u16,
    /// Hash of the predecessor block's header.
    pub prev_hash: Blake2bHash,
    /// Hash of the serialized block body.
    pub body_hash: Blake2bHash,
    /// Root hash of the accounts tree after applying this block.
    pub accounts_hash: Blake2bHash,
    /// Compact difficulty target.
    pub n_bits: u32,
    pub height: u32,
    pub timestamp: u64,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Blake2bHash {
        hash(&self.serialize())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = Vec::with_capacity(BLOCK_HEADER_SIZE);
        self.serialize_into(&mut vbytes);
        vbytes
    }

    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.version.to_be_bytes());
        vbytes.extend(&self.prev_hash);
        vbytes.extend(&self.body_hash);
        vbytes.extend(&self.accounts_hash);
        vbytes.extend(&self.n_bits.to_be_bytes());
        vbytes.extend(&self.height.to_be_bytes());
        vbytes.extend(&self.timestamp.to_be_bytes());
        vbytes.extend(&self.nonce.to_be_bytes());
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<BlockHeader, SerialError> {
        Ok(BlockHeader {
            version: reader.read_u16()?,
            prev_hash: reader.read_array()?,
            body_hash: reader.read_array()?,
            accounts_hash: reader.read_array()?,
            n_bits: reader.read_u32()?,
            height: reader.read_u32()?,
            timestamp: reader.read_u64()?,
            nonce: reader.read_u64()?,
        })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<BlockHeader, SerialError> {
        let mut reader = SerialReader::new(bytes);
        let header = BlockHeader::read_from(&mut reader)?;
        reader.finish()?;
        Ok(header)
    }
}

/// A full block: header plus body. The body is the miner identity, a short
/// free-form data field and the transaction list.
#[derive(Debug, PartialEq, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub miner: PublicKey,
    pub extra_data: Vec<u8>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Blake2bHash {
        self.header.hash()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = vec![];
        self.serialize_into(&mut vbytes);
        vbytes
    }

    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        debug_assert!(self.extra_data.len() <= u8::MAX as usize);
        self.header.serialize_into(vbytes);
        vbytes.extend(&self.miner);
        vbytes.push(self.extra_data.len() as u8);
        vbytes.extend(&self.extra_data);
        vbytes.extend(&(self.transactions.len() as u16).to_be_bytes());
        for tx in &self.transactions {
            tx.serialize_into(vbytes);
        }
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<Block, SerialError> {
        let header = BlockHeader::read_from(reader)?;
        let miner = reader.read_array()?;
        let extra_data_len = reader.read_u8()? as usize;
        let extra_data = reader.read_vec(extra_data_len)?;
        let tx_count = reader.read_u16()? as usize;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::read_from(reader)?);
        }
        Ok(Block {
            header,
            miner,
            extra_data,
            transactions,
        })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block, SerialError> {
        let mut reader = SerialReader::new(bytes);
        let block = Block::read_from(&mut reader)?;
        reader.finish()?;
        Ok(block)
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::transaction::Transaction;

    pub fn make_header(height: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: [7; 32],
            body_hash: [8; 32],
            accounts_hash: [9; 32],
            n_bits: 0x1f00_ffff,
            height,
            timestamp: 1_600_000_000_000,
            nonce: 981,
        }
    }

    pub fn make_block(height: u32, tx_count: u8) -> Block {
        let transactions = (0..tx_count)
            .map(|n| Transaction::new([n; 32], [n; 20], 100, 1, height, [n; 64]))
            .collect();
        Block {
            header: make_header(height),
            miner: [2; 32],
            extra_data: b"mined by meridian".to_vec(),
            transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::{make_block, make_header};
    use super::*;

    #[test]
    fn test_block_header_serialize() {
        let header = make_header(77);
        let serialized_header = header.serialize();
        assert_eq!(serialized_header.len(), BLOCK_HEADER_SIZE);
        let deserialized_header = BlockHeader::deserialize(&serialized_header).unwrap();
        assert_eq!(header, deserialized_header);
    }

    #[test]
    fn test_block_serialize() {
        let block = make_block(77, 3);
        let serialized_block = block.serialize();
        let deserialized_block = Block::deserialize(&serialized_block).unwrap();
        assert_eq!(block, deserialized_block);
    }

    #[test]
    fn test_block_deserialize_truncated() {
        let block = make_block(77, 2);
        let serialized_block = block.serialize();
        let cut = serialized_block.len() - 10;
        assert!(Block::deserialize(&serialized_block[..cut]).is_err());
    }

    #[test]
    fn test_header_hash_changes_with_nonce() {
        let mut header = make_header(1);
        let first = header.hash();
        header.nonce += 1;
        assert_ne!(first, header.hash());
    }
}
