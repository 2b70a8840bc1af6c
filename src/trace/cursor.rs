//! Bounds-checked little-endian reads over an immutable byte buffer.
//!
//! Every field of a trace is read through [`ByteCursor`]; nothing else in the
//! crate indexes into the raw buffer.

use crate::error::TraceError;

/// Read-only view over a trace buffer.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], TraceError> {
        let truncated = || TraceError::TruncatedInput {
            offset,
            len,
            total: self.buf.len(),
            frame: None,
        };
        let end = offset.checked_add(len).ok_or_else(truncated)?;
        self.buf.get(offset..end).ok_or_else(truncated)
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, TraceError> {
        let bytes = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64, TraceError> {
        let bytes = self.read_bytes(offset, 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(word))
    }

    /// Start a sequential reader at `offset`.
    pub fn at(&self, offset: usize) -> Reader<'a> {
        Reader {
            cursor: *self,
            pos: offset,
        }
    }
}

/// Sequential reader that advances past each field it reads.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    cursor: ByteCursor<'a>,
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take_u32(&mut self) -> Result<u32, TraceError> {
        let value = self.cursor.read_u32(self.pos)?;
        self.pos += 4;
        Ok(value)
    }

    pub fn take_u64(&mut self) -> Result<u64, TraceError> {
        let value = self.cursor.read_u64(self.pos)?;
        self.pos += 8;
        Ok(value)
    }

    pub fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], TraceError> {
        let bytes = self.cursor.read_bytes(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }
}
