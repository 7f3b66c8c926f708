//! Big-endian reader over a fully inflated payload
//!
//! Every read is bounds checked and reports a [`DecodeError::ShortRead`]
//! instead of padding with zeroes, so truncated payloads never decode.

use crate::errors::{DecodeError, DecodeResult};

#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a `width` byte unsigned big-endian integer (`width <= 8`)
    pub fn read_uint(&mut self, width: usize) -> DecodeResult<u64> {
        debug_assert!(width <= 8);
        let bytes = self.read_bytes(width)?;
        Ok(bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        Ok(self.read_uint(2)? as u16)
    }

    pub fn read_u24(&mut self) -> DecodeResult<u32> {
        Ok(self.read_uint(3)? as u32)
    }

    /// Borrows the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecodeError::ShortRead {
                offset: self.position,
                needed: len,
                available: self.remaining(),
            });
        }
        let start = self.position;
        self.position += len;
        Ok(&self.data[start..self.position])
    }

    /// Reads a block prefixed by a one byte length
    pub fn read_u8_prefixed(&mut self) -> DecodeResult<&'a [u8]> {
        let len = self.read_u8()? as usize;
        self.read_bytes(len)
    }

    /// Reads a block prefixed by a three byte big-endian length
    pub fn read_u24_prefixed(&mut self) -> DecodeResult<&'a [u8]> {
        let len = self.read_u24()? as usize;
        self.read_bytes(len)
    }
}

/// Decodes a big-endian unsigned integer of at most four bytes
pub fn uint_from_bytes(tag: u8, bytes: &[u8]) -> DecodeResult<i64> {
    if bytes.len() > 4 {
        return Err(DecodeError::IntegerTooWide {
            tag,
            width: bytes.len(),
        });
    }
    Ok(bytes
        .iter()
        .fold(0i64, |acc, &b| (acc << 8) | i64::from(b)))
}

/// Decodes a text payload as UTF-8, falling back to ISO-8859-1
pub fn text_from_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => latin1_to_string(bytes),
    }
}

/// ISO-8859-1 maps every byte onto the code point of the same value
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian_integers() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let mut cursor = BinaryCursor::new(&data);

        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u16().unwrap(), 0x0203);
        assert_eq!(cursor.read_u24().unwrap(), 0x040506);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_short_read_reports_offset() {
        let data = [0x03, b'a', b'b'];
        let mut cursor = BinaryCursor::new(&data);

        let err = cursor.read_u8_prefixed().unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortRead {
                offset: 1,
                needed: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_u24_prefixed_block() {
        let data = [0x00, 0x00, 0x02, 0xAA, 0xBB, 0xCC];
        let mut cursor = BinaryCursor::new(&data);

        assert_eq!(cursor.read_u24_prefixed().unwrap(), &[0xAA, 0xBB]);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_uint_from_bytes() {
        assert_eq!(uint_from_bytes(0x18, &[]).unwrap(), 0);
        assert_eq!(uint_from_bytes(0x18, &[0x07, 0xD0]).unwrap(), 2000);
        assert_eq!(uint_from_bytes(0x13, &[0x01, 0x00, 0x00]).unwrap(), 65_536);
        assert!(matches!(
            uint_from_bytes(0x13, &[0; 5]),
            Err(DecodeError::IntegerTooWide { tag: 0x13, width: 5 })
        ));
    }

    #[test]
    fn test_text_falls_back_to_latin1() {
        assert_eq!(text_from_bytes("Größe".as_bytes()), "Größe");
        assert_eq!(text_from_bytes(&[0x47, 0x72, 0xF6, 0xDF, 0x65]), "Größe");
    }
}
