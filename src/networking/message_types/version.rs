use crate::crypto::{Blake2bHash, PublicKey, Signature};
use crate::network_config::NetworkConfig;
use crate::serialization::{SerialError, SerialReader};
use crate::time::create_timestamp;

/// First message on every connection. Carries enough for the remote to
/// decide whether it wants to talk to us and a nonce for it to sign.
#[derive(Debug, PartialEq, Clone)]
pub struct VersionMessage {
    pub version: u32,
    pub services: u32,
    pub timestamp: u64,
    pub genesis_hash: Blake2bHash,
    pub head_hash: Blake2bHash,
    pub challenge_nonce: [u8; 32],
}

impl VersionMessage {
    pub fn new(
        network_config: &NetworkConfig,
        head_hash: Blake2bHash,
        challenge_nonce: [u8; 32],
    ) -> VersionMessage {
        VersionMessage {
            version: network_config.protocol_version,
            services: network_config.services,
            timestamp: create_timestamp(),
            genesis_hash: network_config.genesis_hash,
            head_hash,
            challenge_nonce,
        }
    }

    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.version.to_be_bytes());
        vbytes.extend(&self.services.to_be_bytes());
        vbytes.extend(&self.timestamp.to_be_bytes());
        vbytes.extend(&self.genesis_hash);
        vbytes.extend(&self.head_hash);
        vbytes.extend(&self.challenge_nonce);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<VersionMessage, SerialError> {
        Ok(VersionMessage {
            version: reader.read_u32()?,
            services: reader.read_u32()?,
            timestamp: reader.read_u64()?,
            genesis_hash: reader.read_array()?,
            head_hash: reader.read_array()?,
            challenge_nonce: reader.read_array()?,
        })
    }
}

/// Answer to VERSION: the peer's identity key and its signature over the
/// challenge nonce. Signature verification is the connection layer's job.
#[derive(Debug, PartialEq, Clone)]
pub struct VerAckMessage {
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl VerAckMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.public_key);
        vbytes.extend(&self.signature);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<VerAckMessage, SerialError> {
        Ok(VerAckMessage {
            public_key: reader.read_array()?,
            signature: reader.read_array()?,
        })
    }
}
