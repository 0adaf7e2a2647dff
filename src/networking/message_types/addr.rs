use std::fmt;

use crate::serialization::{SerialError, SerialReader};
use crate::util::format_host_port;

/// Upper bound on addresses in a single ADDR message.
pub const ADDR_MAX_COUNT: usize = 1000;

/// A peer address as gossiped through the network: what it serves, when it
/// was last seen, and where to reach it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PeerAddr {
    pub services: u32,
    pub timestamp: u64,
    pub host: [u8; 4],
    pub port: u16,
}

impl PeerAddr {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.services.to_be_bytes());
        vbytes.extend(&self.timestamp.to_be_bytes());
        vbytes.extend(&self.host);
        vbytes.extend(&self.port.to_be_bytes());
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<PeerAddr, SerialError> {
        Ok(PeerAddr {
            services: reader.read_u32()?,
            timestamp: reader.read_u64()?,
            host: reader.read_array()?,
            port: reader.read_u16()?,
        })
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_host_port(self.host, self.port))
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AddrMessage {
    pub addresses: Vec<PeerAddr>,
}

impl AddrMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&(self.addresses.len() as u16).to_be_bytes());
        for address in &self.addresses {
            address.serialize_into(vbytes);
        }
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<AddrMessage, SerialError> {
        let count = reader.read_u16()? as usize;
        if count > ADDR_MAX_COUNT {
            return Err(SerialError::TooManyElements(
                "peer addresses",
                count,
                ADDR_MAX_COUNT,
            ));
        }
        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            addresses.push(PeerAddr::read_from(reader)?);
        }
        Ok(AddrMessage { addresses })
    }
}

/// Ask a peer for a slice of its address book.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct GetAddrMessage {
    pub protocol_mask: u8,
    pub service_mask: u32,
    pub max_results: u16,
}

impl GetAddrMessage {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.push(self.protocol_mask);
        vbytes.extend(&self.service_mask.to_be_bytes());
        vbytes.extend(&self.max_results.to_be_bytes());
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<GetAddrMessage, SerialError> {
        Ok(GetAddrMessage {
            protocol_mask: reader.read_u8()?,
            service_mask: reader.read_u32()?,
            max_results: reader.read_u16()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_round_trip() {
        let addr_message = AddrMessage {
            addresses: vec![
                PeerAddr {
                    services: 4,
                    timestamp: 1_600_000_000_000,
                    host: [10, 0, 0, 2],
                    port: 8443,
                },
                PeerAddr {
                    services: 1,
                    timestamp: 1_600_000_100_000,
                    host: [192, 168, 1, 7],
                    port: 12011,
                },
            ],
        };
        let mut vbytes = vec![];
        addr_message.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(AddrMessage::read_from(&mut reader).unwrap(), addr_message);
    }

    #[test]
    fn test_addr_count_cap() {
        let mut vbytes = vec![];
        vbytes.extend(&(ADDR_MAX_COUNT as u16 + 1).to_be_bytes());
        let mut reader = SerialReader::new(&vbytes);
        assert!(AddrMessage::read_from(&mut reader).is_err());
    }

    #[test]
    fn test_peer_addr_display() {
        let peer_addr = PeerAddr {
            services: 4,
            timestamp: 0,
            host: [127, 0, 0, 1],
            port: 8443,
        };
        assert_eq!(peer_addr.to_string(), "127.0.0.1:8443");
    }

    #[test]
    fn test_get_addr_round_trip() {
        let get_addr = GetAddrMessage {
            protocol_mask: 0b11,
            service_mask: 4,
            max_results: 100,
        };
        let mut vbytes = vec![];
        get_addr.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(GetAddrMessage::read_from(&mut reader).unwrap(), get_addr);
    }
}
