use std::convert::TryFrom;

use thiserror::Error;

use crate::block::{Block, BlockHeader};
use crate::crypto::checksum;
use crate::serialization::{SerialError, SerialReader};
use crate::transaction::Transaction;

use super::message_types::addr::{AddrMessage, GetAddrMessage};
use super::message_types::inventory::{
    read_vectors, serialize_vectors, GetBlocksMessage, InvVector,
};
use super::message_types::proofs::{
    AccountsProofMessage, AccountsTreeChunkMessage, BlockProofMessage, ChainProofMessage,
    GetAccountsProofMessage, GetAccountsTreeChunkMessage, GetBlockProofMessage,
    GetTransactionReceiptsMessage, GetTransactionsProofMessage, TransactionReceiptsMessage,
    TransactionsProofMessage,
};
use super::message_types::reject::RejectMessage;
use super::message_types::signal::SignalMessage;
use super::message_types::subscribe::Subscription;
use super::message_types::version::{VerAckMessage, VersionMessage};

/// Sentinel identifying the protocol family. First bytes of every message.
pub const MAGIC: u32 = 0x4204_2042;

/// Size of the frame header: magic + type + length + checksum.
pub const HEADER_SIZE: usize = 13;

/// Prefix needed to peek type and length: magic + type + length.
pub const PEEK_SIZE: usize = 9;

/// Hard cap on a serialized message, header included.
pub const MESSAGE_SIZE_MAX: usize = 10 * 1024 * 1024;

/// Everything that can go wrong turning peer bytes into a message. All of
/// these count as "malformed" for the reject policy; none close the
/// connection by themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("wrong magic {0:#010x}")]
    WrongMagic(u32),

    #[error("unknown message type {0}")]
    UnknownType(u8),

    #[error("message length {declared} does not match buffer length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("message length {0} exceeds maximum message size")]
    ExcessiveSize(usize),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("malformed payload: {0}")]
    Malformed(#[from] SerialError),
}

/// Wire constants for every message kind. The numeric values are frozen:
/// deployed nodes parse by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    Version = 0,
    Inv = 1,
    GetData = 2,
    GetHeader = 3,
    NotFound = 4,
    GetBlocks = 5,
    Block = 6,
    Header = 7,
    Tx = 8,
    Mempool = 9,
    Reject = 10,
    Subscribe = 11,
    Addr = 20,
    GetAddr = 21,
    Ping = 22,
    Pong = 23,
    Signal = 30,
    GetChainProof = 40,
    ChainProof = 41,
    GetAccountsProof = 42,
    AccountsProof = 43,
    GetAccountsTreeChunk = 44,
    AccountsTreeChunk = 45,
    GetTransactionsProof = 47,
    TransactionsProof = 48,
    GetTransactionReceipts = 49,
    TransactionReceipts = 50,
    GetBlockProof = 51,
    BlockProof = 52,
    GetHead = 53,
    Head = 54,
    VerAck = 90,
}

impl TryFrom<u8> for MessageType {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<MessageType, MessageError> {
        match value {
            0 => Ok(MessageType::Version),
            1 => Ok(MessageType::Inv),
            2 => Ok(MessageType::GetData),
            3 => Ok(MessageType::GetHeader),
            4 => Ok(MessageType::NotFound),
            5 => Ok(MessageType::GetBlocks),
            6 => Ok(MessageType::Block),
            7 => Ok(MessageType::Header),
            8 => Ok(MessageType::Tx),
            9 => Ok(MessageType::Mempool),
            10 => Ok(MessageType::Reject),
            11 => Ok(MessageType::Subscribe),
            20 => Ok(MessageType::Addr),
            21 => Ok(MessageType::GetAddr),
            22 => Ok(MessageType::Ping),
            23 => Ok(MessageType::Pong),
            30 => Ok(MessageType::Signal),
            40 => Ok(MessageType::GetChainProof),
            41 => Ok(MessageType::ChainProof),
            42 => Ok(MessageType::GetAccountsProof),
            43 => Ok(MessageType::AccountsProof),
            44 => Ok(MessageType::GetAccountsTreeChunk),
            45 => Ok(MessageType::AccountsTreeChunk),
            47 => Ok(MessageType::GetTransactionsProof),
            48 => Ok(MessageType::TransactionsProof),
            49 => Ok(MessageType::GetTransactionReceipts),
            50 => Ok(MessageType::TransactionReceipts),
            51 => Ok(MessageType::GetBlockProof),
            52 => Ok(MessageType::BlockProof),
            53 => Ok(MessageType::GetHead),
            54 => Ok(MessageType::Head),
            90 => Ok(MessageType::VerAck),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

/// One message, fully typed. The variant determines the payload layout.
#[derive(Debug, PartialEq, Clone)]
pub enum Message {
    Version(VersionMessage),
    VerAck(VerAckMessage),
    Inv(Vec<InvVector>),
    GetData(Vec<InvVector>),
    GetHeader(Vec<InvVector>),
    NotFound(Vec<InvVector>),
    GetBlocks(GetBlocksMessage),
    Block(Block),
    Header(BlockHeader),
    Tx(Transaction),
    Mempool,
    Reject(RejectMessage),
    Subscribe(Subscription),
    Addr(AddrMessage),
    GetAddr(GetAddrMessage),
    Ping(u32),
    Pong(u32),
    Signal(SignalMessage),
    GetChainProof,
    ChainProof(ChainProofMessage),
    GetAccountsProof(GetAccountsProofMessage),
    AccountsProof(AccountsProofMessage),
    GetAccountsTreeChunk(GetAccountsTreeChunkMessage),
    AccountsTreeChunk(AccountsTreeChunkMessage),
    GetTransactionsProof(GetTransactionsProofMessage),
    TransactionsProof(TransactionsProofMessage),
    GetTransactionReceipts(GetTransactionReceiptsMessage),
    TransactionReceipts(TransactionReceiptsMessage),
    GetBlockProof(GetBlockProofMessage),
    BlockProof(BlockProofMessage),
    GetHead,
    Head(BlockHeader),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Version(_) => MessageType::Version,
            Message::VerAck(_) => MessageType::VerAck,
            Message::Inv(_) => MessageType::Inv,
            Message::GetData(_) => MessageType::GetData,
            Message::GetHeader(_) => MessageType::GetHeader,
            Message::NotFound(_) => MessageType::NotFound,
            Message::GetBlocks(_) => MessageType::GetBlocks,
            Message::Block(_) => MessageType::Block,
            Message::Header(_) => MessageType::Header,
            Message::Tx(_) => MessageType::Tx,
            Message::Mempool => MessageType::Mempool,
            Message::Reject(_) => MessageType::Reject,
            Message::Subscribe(_) => MessageType::Subscribe,
            Message::Addr(_) => MessageType::Addr,
            Message::GetAddr(_) => MessageType::GetAddr,
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
            Message::Signal(_) => MessageType::Signal,
            Message::GetChainProof => MessageType::GetChainProof,
            Message::ChainProof(_) => MessageType::ChainProof,
            Message::GetAccountsProof(_) => MessageType::GetAccountsProof,
            Message::AccountsProof(_) => MessageType::AccountsProof,
            Message::GetAccountsTreeChunk(_) => MessageType::GetAccountsTreeChunk,
            Message::AccountsTreeChunk(_) => MessageType::AccountsTreeChunk,
            Message::GetTransactionsProof(_) => MessageType::GetTransactionsProof,
            Message::TransactionsProof(_) => MessageType::TransactionsProof,
            Message::GetTransactionReceipts(_) => MessageType::GetTransactionReceipts,
            Message::TransactionReceipts(_) => MessageType::TransactionReceipts,
            Message::GetBlockProof(_) => MessageType::GetBlockProof,
            Message::BlockProof(_) => MessageType::BlockProof,
            Message::GetHead => MessageType::GetHead,
            Message::Head(_) => MessageType::Head,
        }
    }

    fn serialize_payload(&self, vbytes: &mut Vec<u8>) {
        match self {
            Message::Version(msg) => msg.serialize_into(vbytes),
            Message::VerAck(msg) => msg.serialize_into(vbytes),
            Message::Inv(vectors)
            | Message::GetData(vectors)
            | Message::GetHeader(vectors)
            | Message::NotFound(vectors) => serialize_vectors(vectors, vbytes),
            Message::GetBlocks(msg) => msg.serialize_into(vbytes),
            Message::Block(block) => block.serialize_into(vbytes),
            Message::Header(header) => header.serialize_into(vbytes),
            Message::Tx(tx) => tx.serialize_into(vbytes),
            Message::Mempool => {}
            Message::Reject(msg) => msg.serialize_into(vbytes),
            Message::Subscribe(subscription) => subscription.serialize_into(vbytes),
            Message::Addr(msg) => msg.serialize_into(vbytes),
            Message::GetAddr(msg) => msg.serialize_into(vbytes),
            Message::Ping(nonce) | Message::Pong(nonce) => {
                vbytes.extend(&nonce.to_be_bytes());
            }
            Message::Signal(msg) => msg.serialize_into(vbytes),
            Message::GetChainProof => {}
            Message::ChainProof(msg) => msg.serialize_into(vbytes),
            Message::GetAccountsProof(msg) => msg.serialize_into(vbytes),
            Message::AccountsProof(msg) => msg.serialize_into(vbytes),
            Message::GetAccountsTreeChunk(msg) => msg.serialize_into(vbytes),
            Message::AccountsTreeChunk(msg) => msg.serialize_into(vbytes),
            Message::GetTransactionsProof(msg) => msg.serialize_into(vbytes),
            Message::TransactionsProof(msg) => msg.serialize_into(vbytes),
            Message::GetTransactionReceipts(msg) => msg.serialize_into(vbytes),
            Message::TransactionReceipts(msg) => msg.serialize_into(vbytes),
            Message::GetBlockProof(msg) => msg.serialize_into(vbytes),
            Message::BlockProof(msg) => msg.serialize_into(vbytes),
            Message::GetHead => {}
            Message::Head(header) => header.serialize_into(vbytes),
        }
    }

    fn parse_payload(
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<Message, MessageError> {
        let mut reader = SerialReader::new(payload);
        let message = match message_type {
            MessageType::Version => Message::Version(VersionMessage::read_from(&mut reader)?),
            MessageType::VerAck => Message::VerAck(VerAckMessage::read_from(&mut reader)?),
            MessageType::Inv => Message::Inv(read_vectors(&mut reader)?),
            MessageType::GetData => Message::GetData(read_vectors(&mut reader)?),
            MessageType::GetHeader => Message::GetHeader(read_vectors(&mut reader)?),
            MessageType::NotFound => Message::NotFound(read_vectors(&mut reader)?),
            MessageType::GetBlocks => {
                Message::GetBlocks(GetBlocksMessage::read_from(&mut reader)?)
            }
            MessageType::Block => Message::Block(Block::read_from(&mut reader)?),
            MessageType::Header => Message::Header(BlockHeader::read_from(&mut reader)?),
            MessageType::Tx => Message::Tx(Transaction::read_from(&mut reader)?),
            MessageType::Mempool => Message::Mempool,
            MessageType::Reject => Message::Reject(RejectMessage::read_from(&mut reader)?),
            MessageType::Subscribe => Message::Subscribe(Subscription::read_from(&mut reader)?),
            MessageType::Addr => Message::Addr(AddrMessage::read_from(&mut reader)?),
            MessageType::GetAddr => Message::GetAddr(GetAddrMessage::read_from(&mut reader)?),
            MessageType::Ping => Message::Ping(reader.read_u32()?),
            MessageType::Pong => Message::Pong(reader.read_u32()?),
            MessageType::Signal => Message::Signal(SignalMessage::read_from(&mut reader)?),
            MessageType::GetChainProof => Message::GetChainProof,
            MessageType::ChainProof => {
                Message::ChainProof(ChainProofMessage::read_from(&mut reader)?)
            }
            MessageType::GetAccountsProof => {
                Message::GetAccountsProof(GetAccountsProofMessage::read_from(&mut reader)?)
            }
            MessageType::AccountsProof => {
                Message::AccountsProof(AccountsProofMessage::read_from(&mut reader)?)
            }
            MessageType::GetAccountsTreeChunk => Message::GetAccountsTreeChunk(
                GetAccountsTreeChunkMessage::read_from(&mut reader)?,
            ),
            MessageType::AccountsTreeChunk => {
                Message::AccountsTreeChunk(AccountsTreeChunkMessage::read_from(&mut reader)?)
            }
            MessageType::GetTransactionsProof => Message::GetTransactionsProof(
                GetTransactionsProofMessage::read_from(&mut reader)?,
            ),
            MessageType::TransactionsProof => {
                Message::TransactionsProof(TransactionsProofMessage::read_from(&mut reader)?)
            }
            MessageType::GetTransactionReceipts => Message::GetTransactionReceipts(
                GetTransactionReceiptsMessage::read_from(&mut reader)?,
            ),
            MessageType::TransactionReceipts => {
                Message::TransactionReceipts(TransactionReceiptsMessage::read_from(&mut reader)?)
            }
            MessageType::GetBlockProof => {
                Message::GetBlockProof(GetBlockProofMessage::read_from(&mut reader)?)
            }
            MessageType::BlockProof => {
                Message::BlockProof(BlockProofMessage::read_from(&mut reader)?)
            }
            MessageType::GetHead => Message::GetHead,
            MessageType::Head => Message::Head(BlockHeader::read_from(&mut reader)?),
        };
        reader.finish()?;
        Ok(message)
    }

    /// Wrap an already-serialized payload in a frame. Also the fast path for
    /// relaying blocks without re-serializing them.
    pub fn frame(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
        let mut vbytes: Vec<u8> = Vec::with_capacity(HEADER_SIZE + payload.len());
        vbytes.extend(&MAGIC.to_be_bytes());
        vbytes.push(message_type as u8);
        vbytes.extend(&((HEADER_SIZE + payload.len()) as u32).to_be_bytes());
        vbytes.extend(&checksum(payload));
        vbytes.extend(payload);
        vbytes
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut payload: Vec<u8> = vec![];
        self.serialize_payload(&mut payload);
        Message::frame(self.message_type(), &payload)
    }

    /// Read the declared total length without consuming the buffer. Works on
    /// a partial buffer as long as the 9-byte peek prefix is present.
    pub fn peek_length(buf: &[u8]) -> Result<u32, MessageError> {
        let mut reader = SerialReader::new(buf);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(MessageError::WrongMagic(magic));
        }
        reader.read_u8()?;
        Ok(reader.read_u32()?)
    }

    /// Read the message type without consuming the buffer. Distinguishes an
    /// unparseable header (`WrongMagic`/`Malformed`) from a well-framed
    /// message of a type this build does not know (`UnknownType`).
    pub fn peek_type(buf: &[u8]) -> Result<MessageType, MessageError> {
        let mut reader = SerialReader::new(buf);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(MessageError::WrongMagic(magic));
        }
        MessageType::try_from(reader.read_u8()?)
    }

    /// Full parse of a complete message buffer.
    pub fn parse(buf: &[u8]) -> Result<Message, MessageError> {
        let mut reader = SerialReader::new(buf);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(MessageError::WrongMagic(magic));
        }
        let message_type = MessageType::try_from(reader.read_u8()?)?;
        let declared = reader.read_u32()? as usize;
        if declared != buf.len() {
            return Err(MessageError::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }
        if declared > MESSAGE_SIZE_MAX {
            return Err(MessageError::ExcessiveSize(declared));
        }
        let expected_checksum: [u8; 4] = reader.read_array()?;
        let payload = &buf[HEADER_SIZE..];
        if checksum(payload) != expected_checksum {
            return Err(MessageError::ChecksumMismatch);
        }
        Message::parse_payload(message_type, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::test_helpers::{make_block, make_header};
    use crate::network_config::NetworkConfig;
    use crate::networking::message_types::inventory::{GetBlocksDirection, InvVectorType};
    use crate::networking::message_types::reject::RejectCode;
    use crate::networking::message_types::signal::SignalMessage;
    use crate::transaction::Transaction;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::Version(VersionMessage::new(
                &NetworkConfig::default(),
                [5; 32],
                [6; 32],
            )),
            Message::VerAck(VerAckMessage {
                public_key: [1; 32],
                signature: [2; 64],
            }),
            Message::Inv(vec![InvVector {
                ty: InvVectorType::Block,
                hash: [3; 32],
            }]),
            Message::GetData(vec![InvVector {
                ty: InvVectorType::Transaction,
                hash: [4; 32],
            }]),
            Message::GetHeader(vec![]),
            Message::NotFound(vec![InvVector {
                ty: InvVectorType::Block,
                hash: [5; 32],
            }]),
            Message::GetBlocks(GetBlocksMessage {
                locators: vec![[6; 32]],
                max_inv_size: 500,
                direction: GetBlocksDirection::Forward,
            }),
            Message::Block(make_block(10, 2)),
            Message::Header(make_header(11)),
            Message::Tx(Transaction::new([7; 32], [8; 20], 50, 1, 12, [9; 64])),
            Message::Mempool,
            Message::Reject(RejectMessage::new(
                MessageType::Tx as u8,
                RejectCode::InsufficientFee,
                "fee below relay minimum",
            )),
            Message::Subscribe(Subscription::Addresses(vec![[10; 20]])),
            Message::Addr(AddrMessage {
                addresses: vec![PeerAddr {
                    services: 4,
                    timestamp: 77,
                    host: [10, 0, 0, 1],
                    port: 8443,
                }],
            }),
            Message::GetAddr(GetAddrMessage {
                protocol_mask: 3,
                service_mask: 4,
                max_results: 64,
            }),
            Message::Ping(7),
            Message::Pong(7),
            Message::Signal(SignalMessage {
                sender_id: [11; 16],
                recipient_id: [12; 16],
                nonce: 1,
                ttl: 3,
                flags: 0,
                payload: b"offer".to_vec(),
            }),
            Message::GetChainProof,
            Message::ChainProof(ChainProofMessage {
                prefix: vec![make_header(1)],
                suffix: vec![make_header(2)],
            }),
            Message::GetAccountsProof(GetAccountsProofMessage {
                block_hash: [13; 32],
                addresses: vec![[14; 20]],
            }),
            Message::AccountsProof(AccountsProofMessage {
                block_hash: [15; 32],
                proof: Some(vec![1, 2, 3]),
            }),
            Message::GetAccountsTreeChunk(GetAccountsTreeChunkMessage {
                block_hash: [16; 32],
                start_prefix: "0f".to_string(),
            }),
            Message::AccountsTreeChunk(AccountsTreeChunkMessage {
                block_hash: [17; 32],
                chunk: None,
            }),
            Message::GetTransactionsProof(GetTransactionsProofMessage {
                block_hash: [18; 32],
                addresses: vec![[19; 20]],
            }),
            Message::TransactionsProof(TransactionsProofMessage {
                block_hash: [20; 32],
                proof: Some(vec![4, 5]),
            }),
            Message::GetTransactionReceipts(GetTransactionReceiptsMessage {
                address: [21; 20],
            }),
            Message::TransactionReceipts(TransactionReceiptsMessage {
                receipts: vec![TransactionReceipt {
                    transaction_hash: [22; 32],
                    block_hash: [23; 32],
                    block_height: 9,
                }],
            }),
            Message::GetBlockProof(GetBlockProofMessage {
                block_hash_to_prove: [24; 32],
                known_block_hash: [25; 32],
            }),
            Message::BlockProof(BlockProofMessage {
                proof: vec![make_header(3)],
            }),
            Message::GetHead,
            Message::Head(make_header(999)),
        ]
    }

    use crate::networking::message_types::addr::PeerAddr;
    use crate::networking::message_types::proofs::TransactionReceipt;

    #[test]
    fn test_round_trip_every_variant() {
        for message in sample_messages() {
            let bytes = message.serialize();
            let parsed = Message::parse(&bytes)
                .unwrap_or_else(|e| panic!("{:?} failed to parse: {}", message.message_type(), e));
            assert_eq!(message, parsed);
        }
    }

    #[test]
    fn test_peek_matches_header() {
        let bytes = Message::Ping(42).serialize();
        assert_eq!(Message::peek_type(&bytes).unwrap(), MessageType::Ping);
        assert_eq!(Message::peek_length(&bytes).unwrap() as usize, bytes.len());
        // peeking must work on a partial prefix too
        assert_eq!(
            Message::peek_length(&bytes[..PEEK_SIZE]).unwrap() as usize,
            bytes.len()
        );
    }

    #[test]
    fn test_parse_wrong_magic() {
        let mut bytes = Message::Ping(42).serialize();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Message::parse(&bytes),
            Err(MessageError::WrongMagic(_))
        ));
        assert!(matches!(
            Message::peek_type(&bytes),
            Err(MessageError::WrongMagic(_))
        ));
    }

    #[test]
    fn test_parse_unknown_type() {
        let mut bytes = Message::Ping(42).serialize();
        bytes[4] = 200;
        assert_eq!(Message::parse(&bytes), Err(MessageError::UnknownType(200)));
        assert_eq!(
            Message::peek_type(&bytes),
            Err(MessageError::UnknownType(200))
        );
    }

    #[test]
    fn test_parse_length_mismatch() {
        let mut bytes = Message::Ping(42).serialize();
        bytes[8] = bytes[8].wrapping_add(1);
        assert!(matches!(
            Message::parse(&bytes),
            Err(MessageError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_checksum_mismatch() {
        let mut bytes = Message::Ping(42).serialize();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(Message::parse(&bytes), Err(MessageError::ChecksumMismatch));
    }

    #[test]
    fn test_parse_trailing_payload_bytes() {
        // a ping with an extra byte smuggled into the payload
        let mut payload = 42u32.to_be_bytes().to_vec();
        payload.push(0);
        let bytes = Message::frame(MessageType::Ping, &payload);
        assert_eq!(
            Message::parse(&bytes),
            Err(MessageError::Malformed(SerialError::TrailingBytes))
        );
    }

    #[test]
    fn test_frame_matches_serialize() {
        let block = make_block(4, 1);
        let framed = Message::frame(MessageType::Block, &block.serialize());
        assert_eq!(framed, Message::Block(block).serialize());
    }

    #[test]
    fn test_peek_on_short_buffer() {
        let bytes = Message::Ping(42).serialize();
        assert!(Message::peek_length(&bytes[..PEEK_SIZE - 1]).is_err());
    }
}
