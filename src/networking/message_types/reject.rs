use std::convert::TryFrom;

use crate::serialization::{write_short_string, SerialError, SerialReader};

/// Longest reason string a REJECT may carry.
pub const REASON_MAX_LENGTH: usize = 255;

/// Upper bound on the opaque extra data attached to a REJECT.
pub const EXTRA_DATA_MAX_LENGTH: usize = 1024;

/// Why a message was refused. Codes follow the Bitcoin reject lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectCode {
    Malformed = 0x01,
    Invalid = 0x10,
    Obsolete = 0x11,
    Double = 0x12,
    Dust = 0x41,
    InsufficientFee = 0x42,
}

impl TryFrom<u8> for RejectCode {
    type Error = SerialError;

    fn try_from(value: u8) -> Result<RejectCode, SerialError> {
        match value {
            0x01 => Ok(RejectCode::Malformed),
            0x10 => Ok(RejectCode::Invalid),
            0x11 => Ok(RejectCode::Obsolete),
            0x12 => Ok(RejectCode::Double),
            0x41 => Ok(RejectCode::Dust),
            0x42 => Ok(RejectCode::InsufficientFee),
            _ => Err(SerialError::InvalidValue("reject code")),
        }
    }
}

/// Tells a peer why one of its messages was refused.
///
/// `message_type` is kept as the raw wire byte: peers may reject messages
/// whose type this build does not know, and a strict decode here would turn
/// their REJECT into a channel close.
#[derive(Debug, PartialEq, Clone)]
pub struct RejectMessage {
    pub message_type: u8,
    pub code: RejectCode,
    pub reason: String,
    pub extra_data: Vec<u8>,
}

impl RejectMessage {
    /// Build a reject, clamping the reason to the wire limit on a char
    /// boundary.
    pub fn new(message_type: u8, code: RejectCode, reason: &str) -> RejectMessage {
        let mut reason = reason.to_string();
        if reason.len() > REASON_MAX_LENGTH {
            let mut end = REASON_MAX_LENGTH;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        RejectMessage {
            message_type,
            code,
            reason,
            extra_data: vec![],
        }
    }

    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        vbytes.push(self.message_type);
        vbytes.push(self.code as u8);
        write_short_string(vbytes, &self.reason);
        vbytes.extend(&(self.extra_data.len() as u16).to_be_bytes());
        vbytes.extend(&self.extra_data);
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<RejectMessage, SerialError> {
        let message_type = reader.read_u8()?;
        let code = RejectCode::try_from(reader.read_u8()?)?;
        let reason = reader.read_short_string()?;
        let extra_data_len = reader.read_u16()? as usize;
        if extra_data_len > EXTRA_DATA_MAX_LENGTH {
            return Err(SerialError::TooManyElements(
                "reject extra data bytes",
                extra_data_len,
                EXTRA_DATA_MAX_LENGTH,
            ));
        }
        let extra_data = reader.read_vec(extra_data_len)?;
        Ok(RejectMessage {
            message_type,
            code,
            reason,
            extra_data,
        })
    }
}
