//! Little-endian fixed-width integer I/O.
//!
//! Every record type in [`crate::spec`] and [`crate::patch`] is built out of
//! these primitives. Keeping them in one place means the byte order only
//! needs stating once.

use crate::result::{Error, Result};

/// A cursor over an in-memory byte slice, used to read records out of a
/// loaded archive or patch stream.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the next 4 bytes without consuming them; used to peek at a
    /// signature before deciding which record type to parse.
    pub fn peek_signature(&self) -> Option<[u8; 4]> {
        if self.buf.len() < 4 {
            return None;
        }
        let mut sig = [0u8; 4];
        sig.copy_from_slice(&self.buf[..4]);
        Some(sig)
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::Truncated(what));
        }
        let (taken, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(taken)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Expects and consumes the given 4-byte magic, failing with
    /// `InvalidArchive` on a mismatch.
    pub fn expect_signature(&mut self, magic: [u8; 4], what: &'static str) -> Result<()> {
        let b = self.take(4, "signature")?;
        if b != magic {
            return Err(Error::InvalidArchive(what));
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len, "byte field")
    }

    /// Reads `len` bytes and interprets them as UTF-8.
    pub fn read_string(&mut self, len: usize, field: &'static str) -> Result<String> {
        let b = self.take(len, "string")?;
        std::str::from_utf8(b)
            .map(str::to_owned)
            .map_err(|e| Error::Encoding(field, e))
    }
}

/// A growable byte buffer used to serialize records.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
}
