use crate::crypto::{hash, Address, Blake2bHash, PublicKey, Signature};
use crate::serialization::{SerialError, SerialReader};

/// Serialized size of a transaction in bytes.
pub const TRANSACTION_SIZE: usize = 136;

/// A basic value transfer between two accounts. The messaging layer only
/// frames and relays these; validation happens in the accounts module.
#[derive(Debug, PartialEq, Clone)]
pub struct Transaction {
    /// Public key of the sending account.
    pub sender: PublicKey,
    /// Address of the receiving account.
    pub recipient: Address,
    /// Amount transferred, in the smallest unit.
    pub value: u64,
    /// Fee paid to the block producer.
    pub fee: u64,
    /// First block height at which this transaction may be included.
    pub validity_start_height: u32,
    /// Signature over all preceding fields.
    pub signature: Signature,
}

impl Transaction {
    pub fn new(
        sender: PublicKey,
        recipient: Address,
        value: u64,
        fee: u64,
        validity_start_height: u32,
        signature: Signature,
    ) -> Transaction {
        Transaction {
            sender,
            recipient,
            value,
            fee,
            validity_start_height,
            signature,
        }
    }

    pub fn hash(&self) -> Blake2bHash {
        hash(&self.serialize())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut vbytes: Vec<u8> = Vec::with_capacity(TRANSACTION_SIZE);
        self.serialize_into(&mut vbytes);
        vbytes
    }

    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.sender);
        vbytes.extend(&self.recipient);
        vbytes.extend(&self.value.to_be_bytes());
        vbytes.extend(&self.fee.to_be_bytes());
        vbytes.extend(&self.validity_start_height.to_be_bytes());
        vbytes.extend(&self.signature);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<Transaction, SerialError> {
        Ok(Transaction {
            sender: reader.read_array()?,
            recipient: reader.read_array()?,
            value: reader.read_u64()?,
            fee: reader.read_u64()?,
            validity_start_height: reader.read_u32()?,
            signature: reader.read_array()?,
        })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction, SerialError> {
        let mut reader = SerialReader::new(bytes);
        let tx = Transaction::read_from(&mut reader)?;
        reader.finish()?;
        Ok(tx)
    }
}
