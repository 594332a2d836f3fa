//! LEB128 variable-length integers.

use crate::{Error, Result};

pub fn write_u32(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    write_i64(out, value as i64);
}

pub fn write_i64(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Fixed five-byte encoding, for length slots patched after the fact
pub fn write_u32_padded(out: &mut [u8], mut value: u32) {
    for (i, slot) in out.iter_mut().take(5).enumerate() {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        *slot = if i == 4 { byte } else { byte | 0x80 };
    }
}

/// Cursor over a byte slice; every read reports the absolute offset on failure
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Offset of `bytes[0]` within the whole module
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::at(bytes, 0)
    }

    pub fn at(bytes: &'a [u8], base: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            base,
        }
    }

    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::decode(self.offset(), message)
    }

    pub fn byte(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.error(format!("need {} more bytes", len)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.byte()?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(self.error("u32 LEB128 too long"));
            }
        }
        u32::try_from(result).map_err(|_| self.error("u32 LEB128 out of range"))
    }

    pub fn i64(&mut self) -> Result<i64> {
        let mut result: i64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.byte()?;
            if shift < 64 {
                result |= ((byte & 0x7F) as i64) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
            if shift >= 70 {
                return Err(self.error("i64 LEB128 too long"));
            }
        }
    }

    pub fn i32(&mut self) -> Result<i32> {
        let value = self.i64()?;
        i32::try_from(value).map_err(|_| self.error("i32 LEB128 out of range"))
    }

    pub fn f32(&mut self) -> Result<f32> {
        let raw = self.bytes(4)?;
        Ok(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn f64(&mut self) -> Result<f64> {
        let raw = self.bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(f64::from_le_bytes(buf))
    }

    /// Length-prefixed UTF-8 name
    pub fn name(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| self.error("name is not UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc_u32(v: u32) -> Vec<u8> {
        let mut out = Vec::new();
        write_u32(&mut out, v);
        out
    }

    fn enc_i64(v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_i64(&mut out, v);
        out
    }

    #[test]
    fn test_known_unsigned_encodings() {
        assert_eq!(enc_u32(0), vec![0x00]);
        assert_eq!(enc_u32(127), vec![0x7F]);
        assert_eq!(enc_u32(128), vec![0x80, 0x01]);
        assert_eq!(enc_u32(624485), vec![0xE5, 0x8E, 0x26]);
    }

    #[test]
    fn test_known_signed_encodings() {
        assert_eq!(enc_i64(-1), vec![0x7F]);
        assert_eq!(enc_i64(63), vec![0x3F]);
        assert_eq!(enc_i64(64), vec![0xC0, 0x00]);
        assert_eq!(enc_i64(-123456), vec![0xC0, 0xBB, 0x78]);
    }

    #[test]
    fn test_padded_encoding_decodes() {
        let mut buf = [0u8; 5];
        write_u32_padded(&mut buf, 300);
        let mut r = Reader::new(&buf);
        assert_eq!(r.u32().unwrap(), 300);
        assert!(r.is_empty());
    }

    #[test]
    fn test_truncated_input_reports_offset() {
        let mut r = Reader::at(&[0x80], 16);
        match r.u32() {
            Err(Error::Decode { offset, .. }) => assert_eq!(offset, 17),
            other => panic!("expected decode error, got {:?}", other),
        }
    }
}
