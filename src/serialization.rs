use std::convert::TryInto;

use thiserror::Error;

/// Errors raised while decoding the hand-rolled binary formats. Every reader
/// failure maps to one of these; none of them panic on peer-supplied bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerialError {
    #[error("unexpected end of buffer")]
    UnexpectedEnd,

    #[error("invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("{0} count {1} exceeds maximum {2}")]
    TooManyElements(&'static str, usize, usize),

    #[error("invalid utf-8 string")]
    InvalidString,

    #[error("trailing bytes after payload")]
    TrailingBytes,
}

/// Cursor over a byte slice. All integers are read big-endian, matching the
/// network byte order used throughout the wire format.
pub struct SerialReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SerialReader<'a> {
    pub fn new(buf: &'a [u8]) -> SerialReader<'a> {
        SerialReader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, SerialError> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, SerialError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes(bytes.try_into().expect("2-byte slice")))
    }

    pub fn read_u32(&mut self) -> Result<u32, SerialError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("4-byte slice")))
    }

    pub fn read_u64(&mut self) -> Result<u64, SerialError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().expect("8-byte slice")))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], SerialError> {
        if self.remaining() < n {
            return Err(SerialError::UnexpectedEnd);
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SerialError> {
        let bytes = self.read_bytes(N)?;
        Ok(bytes.try_into().expect("sized slice"))
    }

    pub fn read_vec(&mut self, n: usize) -> Result<Vec<u8>, SerialError> {
        Ok(self.read_bytes(n)?.to_vec())
    }

    /// Read a u8-length-prefixed utf-8 string.
    pub fn read_short_string(&mut self) -> Result<String, SerialError> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerialError::InvalidString)
    }

    /// Fails unless the reader has consumed the buffer exactly.
    pub fn finish(self) -> Result<(), SerialError> {
        if self.remaining() > 0 {
            return Err(SerialError::TrailingBytes);
        }
        Ok(())
    }
}

/// Write a u8-length-prefixed utf-8 string. The caller guarantees the string
/// fits in 255 bytes.
pub fn write_short_string(vbytes: &mut Vec<u8>, s: &str) {
    debug_assert!(s.len() <= u8::MAX as usize);
    vbytes.push(s.len() as u8);
    vbytes.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_integers() {
        let buf = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03];
        let mut reader = SerialReader::new(&buf);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u16().unwrap(), 2);
        assert_eq!(reader.read_u32().unwrap(), 3);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_reader_underflow() {
        let buf = [0x00, 0x01];
        let mut reader = SerialReader::new(&buf);
        assert_eq!(reader.read_u32(), Err(SerialError::UnexpectedEnd));
    }

    #[test]
    fn test_reader_trailing_bytes() {
        let buf = [0x00, 0x01, 0x02];
        let mut reader = SerialReader::new(&buf);
        reader.read_u16().unwrap();
        assert_eq!(reader.finish(), Err(SerialError::TrailingBytes));
    }

    #[test]
    fn test_short_string_round_trip() {
        let mut vbytes = vec![];
        write_short_string(&mut vbytes, "checksum mismatch");
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(reader.read_short_string().unwrap(), "checksum mismatch");
    }

    #[test]
    fn test_short_string_invalid_utf8() {
        let buf = [2, 0xff, 0xfe];
        let mut reader = SerialReader::new(&buf);
        assert_eq!(reader.read_short_string(), Err(SerialError::InvalidString));
    }
}
