//! Length-prefixed binary serialization primitives.
//!
//! Everything that crosses the wire or is framed into a message payload goes
//! through the [`Serializer`] and [`Deserializer`] pair defined here. The
//! format is deliberately boring: fixed-width integers in network byte order
//! (big-endian), strings as a `u32` byte-count followed by raw UTF-8 bytes.
//!
//! `u64` values are written as two big-endian `u32` halves, high word first,
//! so that every multi-byte write funnels through the same 32-bit path.
//!
//! The deserializer borrows its input and walks it with a cursor; every read
//! is bounds-checked and returns a [`SerializationError`] instead of slicing
//! past the end. String reads additionally enforce [`MAX_STRING_LEN`].

use thiserror::Error;

/// Upper bound on the byte length of any wire string (1 MiB).
pub const MAX_STRING_LEN: usize = 1024 * 1024;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SerializationError {
    #[error("write would exceed the buffer limit")]
    BufferOverflow,
    #[error("insufficient data remaining in buffer")]
    InsufficientData,
    #[error("malformed value in buffer")]
    InvalidFormat,
    #[error("string length exceeds the {MAX_STRING_LEN} byte limit")]
    StringTooLong,
}

/// Growable byte buffer that values are appended to in wire order.
#[derive(Debug, Default)]
pub struct Serializer {
    buffer: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Written as two big-endian `u32` halves, high then low.
    pub fn write_u64(&mut self, value: u64) {
        self.write_u32((value >> 32) as u32);
        self.write_u32(value as u32);
    }

    /// Length-prefixed string: `u32` byte count, then the raw bytes.
    pub fn write_string(&mut self, value: &str) -> Result<(), SerializationError> {
        if value.len() > MAX_STRING_LEN {
            return Err(SerializationError::StringTooLong);
        }
        self.write_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Cursor over a borrowed byte slice; reads advance, peeks do not.
#[derive(Debug)]
pub struct Deserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn has_remaining(&self, bytes: usize) -> bool {
        self.remaining() >= bytes
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn skip(&mut self, bytes: usize) -> Result<(), SerializationError> {
        if !self.has_remaining(bytes) {
            return Err(SerializationError::InsufficientData);
        }
        self.position += bytes;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, SerializationError> {
        if !self.has_remaining(1) {
            return Err(SerializationError::InsufficientData);
        }
        let value = self.buffer[self.position];
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, SerializationError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes(bytes.try_into().expect("two bytes")))
    }

    pub fn read_u32(&mut self) -> Result<u32, SerializationError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().expect("four bytes")))
    }

    pub fn read_u64(&mut self) -> Result<u64, SerializationError> {
        let high = self.read_u32()? as u64;
        let low = self.read_u32()? as u64;
        Ok((high << 32) | low)
    }

    pub fn read_string(&mut self) -> Result<String, SerializationError> {
        let length = self.read_u32()? as usize;
        if length > MAX_STRING_LEN {
            return Err(SerializationError::StringTooLong);
        }
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidFormat)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, SerializationError> {
        Ok(self.take(count)?.to_vec())
    }

    pub fn peek_u8(&self) -> Result<u8, SerializationError> {
        if !self.has_remaining(1) {
            return Err(SerializationError::InsufficientData);
        }
        Ok(self.buffer[self.position])
    }

    pub fn peek_u32(&self) -> Result<u32, SerializationError> {
        if !self.has_remaining(4) {
            return Err(SerializationError::InsufficientData);
        }
        let bytes = &self.buffer[self.position..self.position + 4];
        Ok(u32::from_be_bytes(bytes.try_into().expect("four bytes")))
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], SerializationError> {
        if !self.has_remaining(count) {
            return Err(SerializationError::InsufficientData);
        }
        let slice = &self.buffer[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }
}
