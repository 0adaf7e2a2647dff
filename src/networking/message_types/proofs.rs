//! Light-client proof messages. The proof bodies themselves (accounts tree
//! branches, merkle paths) are opaque to the messaging layer: it frames the
//! bytes, the chain and accounts modules interpret them.

use crate::block::BlockHeader;
use crate::crypto::{Address, Blake2bHash};
use crate::serialization::{SerialError, SerialReader};

/// Upper bound on header lists inside proof messages.
pub const PROOF_HEADERS_MAX_COUNT: usize = 8192;

/// Upper bound on addresses in a proof request.
pub const PROOF_ADDRESSES_MAX_COUNT: usize = 256;

/// Upper bound on transaction receipts in one response.
pub const RECEIPTS_MAX_COUNT: usize = 500;

fn serialize_headers(headers: &[BlockHeader], vbytes: &mut Vec<u8>) {
    vbytes.extend(&(headers.len() as u16).to_be_bytes());
    for header in headers {
        header.serialize_into(vbytes);
    }
}

fn read_headers(reader: &mut SerialReader<'_>) -> Result<Vec<BlockHeader>, SerialError> {
    let count = reader.read_u16()? as usize;
    if count > PROOF_HEADERS_MAX_COUNT {
        return Err(SerialError::TooManyElements(
            "proof headers",
            count,
            PROOF_HEADERS_MAX_COUNT,
        ));
    }
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        headers.push(BlockHeader::read_from(reader)?);
    }
    Ok(headers)
}

fn serialize_addresses(addresses: &[Address], vbytes: &mut Vec<u8>) {
    vbytes.extend(&(addresses.len() as u16).to_be_bytes());
    for address in addresses {
        vbytes.extend(address);
    }
}

fn read_addresses(reader: &mut SerialReader<'_>) -> Result<Vec<Address>, SerialError> {
    let count = reader.read_u16()? as usize;
    if count > PROOF_ADDRESSES_MAX_COUNT {
        return Err(SerialError::TooManyElements(
            "proof addresses",
            count,
            PROOF_ADDRESSES_MAX_COUNT,
        ));
    }
    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        addresses.push(reader.read_array()?);
    }
    Ok(addresses)
}

// Opaque proof bodies: presence flag, then u32-length-prefixed bytes. An
// absent body is a valid answer ("I cannot prove that").
fn serialize_opt_bytes(bytes: &Option<Vec<u8>>, vbytes: &mut Vec<u8>) {
    match bytes {
        Some(bytes) => {
            vbytes.push(1);
            vbytes.extend(&(bytes.len() as u32).to_be_bytes());
            vbytes.extend(bytes);
        }
        None => vbytes.push(0),
    }
}

fn read_opt_bytes(reader: &mut SerialReader<'_>) -> Result<Option<Vec<u8>>, SerialError> {
    match reader.read_u8()? {
        0 => Ok(None),
        1 => {
            let len = reader.read_u32()? as usize;
            if len > reader.remaining() {
                return Err(SerialError::UnexpectedEnd);
            }
            Ok(Some(reader.read_vec(len)?))
        }
        _ => Err(SerialError::InvalidValue("proof presence flag")),
    }
}

/// An interlink-compressed chain proof: a sparse prefix back to genesis and
/// a dense suffix up to the sender's head.
#[derive(Debug, PartialEq, Clone)]
pub struct ChainProofMessage {
    pub prefix: Vec<BlockHeader>,
    pub suffix: Vec<BlockHeader>,
}

impl ChainProofMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        serialize_headers(&self.prefix, vbytes);
        serialize_headers(&self.suffix, vbytes);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<ChainProofMessage, SerialError> {
        Ok(ChainProofMessage {
            prefix: read_headers(reader)?,
            suffix: read_headers(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct GetAccountsProofMessage {
    pub block_hash: Blake2bHash,
    pub addresses: Vec<Address>,
}

impl GetAccountsProofMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.block_hash);
        serialize_addresses(&self.addresses, vbytes);
    }

    pub fn read_from(
        reader: &mut SerialReader<'_>,
    ) -> Result<GetAccountsProofMessage, SerialError> {
        Ok(GetAccountsProofMessage {
            block_hash: reader.read_array()?,
            addresses: read_addresses(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AccountsProofMessage {
    pub block_hash: Blake2bHash,
    pub proof: Option<Vec<u8>>,
}

impl AccountsProofMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.block_hash);
        serialize_opt_bytes(&self.proof, vbytes);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<AccountsProofMessage, SerialError> {
        Ok(AccountsProofMessage {
            block_hash: reader.read_array()?,
            proof: read_opt_bytes(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct GetAccountsTreeChunkMessage {
    pub block_hash: Blake2bHash,
    /// Nibble prefix to start the chunk at, e.g. "00ab".
    pub start_prefix: String,
}

impl GetAccountsTreeChunkMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.block_hash);
        crate::serialization::write_short_string(vbytes, &self.start_prefix);
    }

    pub fn read_from(
        reader: &mut SerialReader<'_>,
    ) -> Result<GetAccountsTreeChunkMessage, SerialError> {
        Ok(GetAccountsTreeChunkMessage {
            block_hash: reader.read_array()?,
            start_prefix: reader.read_short_string()?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AccountsTreeChunkMessage {
    pub block_hash: Blake2bHash,
    pub chunk: Option<Vec<u8>>,
}

impl AccountsTreeChunkMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.block_hash);
        serialize_opt_bytes(&self.chunk, vbytes);
    }

    pub fn read_from(
        reader: &mut SerialReader<'_>,
    ) -> Result<AccountsTreeChunkMessage, SerialError> {
        Ok(AccountsTreeChunkMessage {
            block_hash: reader.read_array()?,
            chunk: read_opt_bytes(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct GetTransactionsProofMessage {
    pub block_hash: Blake2bHash,
    pub addresses: Vec<Address>,
}

impl GetTransactionsProofMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.block_hash);
        serialize_addresses(&self.addresses, vbytes);
    }

    pub fn read_from(
        reader: &mut SerialReader<'_>,
    ) -> Result<GetTransactionsProofMessage, SerialError> {
        Ok(GetTransactionsProofMessage {
            block_hash: reader.read_array()?,
            addresses: read_addresses(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct TransactionsProofMessage {
    pub block_hash: Blake2bHash,
    pub proof: Option<Vec<u8>>,
}

impl TransactionsProofMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.block_hash);
        serialize_opt_bytes(&self.proof, vbytes);
    }

    pub fn read_from(
        reader: &mut SerialReader<'_>,
    ) -> Result<TransactionsProofMessage, SerialError> {
        Ok(TransactionsProofMessage {
            block_hash: reader.read_array()?,
            proof: read_opt_bytes(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct GetTransactionReceiptsMessage {
    pub address: Address,
}

impl GetTransactionReceiptsMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.address);
    }

    pub fn read_from(
        reader: &mut SerialReader<'_>,
    ) -> Result<GetTransactionReceiptsMessage, SerialError> {
        Ok(GetTransactionReceiptsMessage {
            address: reader.read_array()?,
        })
    }
}

/// Where a transaction was included.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TransactionReceipt {
    pub transaction_hash: Blake2bHash,
    pub block_hash: Blake2bHash,
    pub block_height: u32,
}

impl TransactionReceipt {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.transaction_hash);
        vbytes.extend(&self.block_hash);
        vbytes.extend(&self.block_height.to_be_bytes());
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<TransactionReceipt, SerialError> {
        Ok(TransactionReceipt {
            transaction_hash: reader.read_array()?,
            block_hash: reader.read_array()?,
            block_height: reader.read_u32()?,
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct TransactionReceiptsMessage {
    pub receipts: Vec<TransactionReceipt>,
}

impl TransactionReceiptsMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&(self.receipts.len() as u16).to_be_bytes());
        for receipt in &self.receipts {
            receipt.serialize_into(vbytes);
        }
    }

    pub fn read_from(
        reader: &mut SerialReader<'_>,
    ) -> Result<TransactionReceiptsMessage, SerialError> {
        let count = reader.read_u16()? as usize;
        if count > RECEIPTS_MAX_COUNT {
            return Err(SerialError::TooManyElements(
                "transaction receipts",
                count,
                RECEIPTS_MAX_COUNT,
            ));
        }
        let mut receipts = Vec::with_capacity(count);
        for _ in 0..count {
            receipts.push(TransactionReceipt::read_from(reader)?);
        }
        Ok(TransactionReceiptsMessage { receipts })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct GetBlockProofMessage {
    pub block_hash_to_prove: Blake2bHash,
    pub known_block_hash: Blake2bHash,
}

impl GetBlockProofMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.block_hash_to_prove);
        vbytes.extend(&self.known_block_hash);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<GetBlockProofMessage, SerialError> {
        Ok(GetBlockProofMessage {
            block_hash_to_prove: reader.read_array()?,
            known_block_hash: reader.read_array()?,
        })
    }
}

/// An interlink path connecting two blocks, oldest first.
#[derive(Debug, PartialEq, Clone)]
pub struct BlockProofMessage {
    pub proof: Vec<BlockHeader>,
}

impl BlockProofMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        serialize_headers(&self.proof, vbytes);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<BlockProofMessage, SerialError> {
        Ok(BlockProofMessage {
            proof: read_headers(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::test_helpers::make_header;

    #[test]
    fn test_chain_proof_round_trip() {
        let chain_proof = ChainProofMessage {
            prefix: vec![make_header(1), make_header(128)],
            suffix: vec![make_header(1000), make_header(1001)],
        };
        let mut vbytes = vec![];
        chain_proof.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(
            ChainProofMessage::read_from(&mut reader).unwrap(),
            chain_proof
        );
    }

    #[test]
    fn test_accounts_proof_round_trip() {
        for proof in [None, Some(vec![0xaa, 0xbb])] {
            let accounts_proof = AccountsProofMessage {
                block_hash: [9; 32],
                proof,
            };
            let mut vbytes = vec![];
            accounts_proof.serialize_into(&mut vbytes);
            let mut reader = SerialReader::new(&vbytes);
            assert_eq!(
                AccountsProofMessage::read_from(&mut reader).unwrap(),
                accounts_proof
            );
        }
    }

    #[test]
    fn test_opt_bytes_length_lie() {
        // presence flag says 100 bytes follow, but only 2 do
        let mut vbytes = vec![];
        vbytes.extend(&[3u8; 32]);
        vbytes.push(1);
        vbytes.extend(&100u32.to_be_bytes());
        vbytes.extend(&[0u8; 2]);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(
            AccountsProofMessage::read_from(&mut reader),
            Err(SerialError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_tree_chunk_round_trip() {
        let get_chunk = GetAccountsTreeChunkMessage {
            block_hash: [1; 32],
            start_prefix: "00ab".to_string(),
        };
        let mut vbytes = vec![];
        get_chunk.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(
            GetAccountsTreeChunkMessage::read_from(&mut reader).unwrap(),
            get_chunk
        );
    }

    #[test]
    fn test_receipts_round_trip() {
        let receipts_message = TransactionReceiptsMessage {
            receipts: vec![TransactionReceipt {
                transaction_hash: [1; 32],
                block_hash: [2; 32],
                block_height: 500,
            }],
        };
        let mut vbytes = vec![];
        receipts_message.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(
            TransactionReceiptsMessage::read_from(&mut reader).unwrap(),
            receipts_message
        );
    }

    #[test]
    fn test_block_proof_round_trip() {
        let block_proof = BlockProofMessage {
            proof: vec![make_header(64), make_header(96), make_header(100)],
        };
        let mut vbytes = vec![];
        block_proof.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(
            BlockProofMessage::read_from(&mut reader).unwrap(),
            block_proof
        );
    }
}
