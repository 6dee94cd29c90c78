//! Byte-level reader and writer for the canonical encoding.
//!
//! Every integer is written little-endian at a fixed width. Variable-length
//! data (strings, sequences) is prefixed with a `u32` count written
//! immediately before the elements. The [`Reader`] refuses any declared count
//! above its sequence ceiling so a corrupted or hostile buffer cannot trigger
//! an enormous allocation.

use crate::CodecError;

/// Default upper bound on any declared sequence length.
pub const DEFAULT_SEQUENCE_CEILING: u32 = 1 << 20;

/// Upper bound on elements preallocated for a sequence before reading them.
const PREALLOC_CLAMP: usize = 1024;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends canonical bytes to an owned buffer.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    /// Write a sequence count.
    ///
    /// # Panics
    ///
    /// Panics if `len` does not fit in a `u32`; such a sequence could never
    /// be read back.
    pub fn write_len(&mut self, len: usize) {
        let len = u32::try_from(len).expect("sequence length exceeds u32::MAX");
        self.write_u32(len);
    }

    /// Write raw bytes without a length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Reads canonical bytes from a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    ceiling: u32,
}

impl<'a> Reader<'a> {
    /// Create a reader with the [`DEFAULT_SEQUENCE_CEILING`].
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_ceiling(data, DEFAULT_SEQUENCE_CEILING)
    }

    /// Create a reader that rejects sequences longer than `ceiling`.
    pub fn with_ceiling(data: &'a [u8], ceiling: u32) -> Self {
        Self {
            data,
            pos: 0,
            ceiling,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The configured sequence ceiling.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Fail with [`CodecError::TrailingBytes`] unless the buffer is exhausted.
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read a sequence count, enforcing the ceiling.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_u32()?;
        if len > self.ceiling {
            tracing::warn!(
                len,
                ceiling = self.ceiling,
                "declared sequence length exceeds ceiling -- rejecting input"
            );
            return Err(CodecError::SequenceTooLong {
                len,
                ceiling: self.ceiling,
            });
        }
        Ok(len as usize)
    }

    /// Capacity to reserve for a sequence of `len` elements.
    pub fn prealloc(len: usize) -> usize {
        len.min(PREALLOC_CLAMP)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
