use crate::crypto::PeerId;
use crate::serialization::{SerialError, SerialReader};

/// TTL assigned to a freshly created signal.
pub const SIGNAL_TTL_INITIAL: u8 = 3;

/// Upper bound on the opaque signalling payload (SDP offers/answers and ICE
/// candidates stay well under this).
pub const SIGNAL_PAYLOAD_MAX_LENGTH: usize = 16_000;

// Signal flag bits.
pub const SIGNAL_FLAG_UNROUTABLE: u8 = 0x01;
pub const SIGNAL_FLAG_TTL_EXCEEDED: u8 = 0x02;

/// WebRTC signalling data routed between two peers via their shared
/// WebSocket neighbours. The payload is opaque to every hop.
#[derive(Debug, PartialEq, Clone)]
pub struct SignalMessage {
    pub sender_id: PeerId,
    pub recipient_id: PeerId,
    pub nonce: u32,
    pub ttl: u8,
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl SignalMessage {
    pub fn is_unroutable(&self) -> bool {
        self.flags & SIGNAL_FLAG_UNROUTABLE != 0
    }

    pub fn is_ttl_exceeded(&self) -> bool {
        self.flags & SIGNAL_FLAG_TTL_EXCEEDED != 0
    }

    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.extend(&self.sender_id);
        vbytes.extend(&self.recipient_id);
        vbytes.extend(&self.nonce.to_be_bytes());
        vbytes.push(self.ttl);
        vbytes.push(self.flags);
        vbytes.extend(&(self.payload.len() as u16).to_be_bytes());
        vbytes.extend(&self.payload);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<SignalMessage, SerialError> {
        let sender_id = reader.read_array()?;
        let recipient_id = reader.read_array()?;
        let nonce = reader.read_u32()?;
        let ttl = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let payload_len = reader.read_u16()? as usize;
        if payload_len > SIGNAL_PAYLOAD_MAX_LENGTH {
            return Err(SerialError::TooManyElements(
                "signal payload bytes",
                payload_len,
                SIGNAL_PAYLOAD_MAX_LENGTH,
            ));
        }
        let payload = reader.read_vec(payload_len)?;
        Ok(SignalMessage {
            sender_id,
            recipient_id,
            nonce,
            ttl,
            flags,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_round_trip() {
        let signal = SignalMessage {
            sender_id: [1; 16],
            recipient_id: [2; 16],
            nonce: 7,
            ttl: SIGNAL_TTL_INITIAL,
            flags: 0,
            payload: b"candidate:0 1 UDP".to_vec(),
        };
        let mut vbytes = vec![];
        signal.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(SignalMessage::read_from(&mut reader).unwrap(), signal);
    }

    #[test]
    fn test_signal_flags() {
        let mut signal = SignalMessage {
            sender_id: [1; 16],
            recipient_id: [2; 16],
            nonce: 7,
            ttl: 0,
            flags: SIGNAL_FLAG_TTL_EXCEEDED,
            payload: vec![],
        };
        assert!(signal.is_ttl_exceeded());
        assert!(!signal.is_unroutable());
        signal.flags = SIGNAL_FLAG_UNROUTABLE;
        assert!(signal.is_unroutable());
    }
}
