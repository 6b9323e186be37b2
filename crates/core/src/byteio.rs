//! Byte-level I/O for the show container's binary record stream.
//!
//! All integers are little-endian. Strings are length-prefixed: the byte
//! length is written as a 7-bit varint (low 7 bits first, high bit set on
//! every byte except the last, at most 5 bytes), followed by UTF-8 bytes.
//!
//! # Example
//! ```
//! use showtape_core::byteio::{ByteReader, ByteWriter};
//!
//! let mut writer = ByteWriter::new();
//! writer.write_u8(0x0C);
//! writer.write_i32(-1);
//! writer.write_string("rshwFormat");
//!
//! let bytes = writer.finish();
//! let mut reader = ByteReader::new(&bytes);
//! assert_eq!(reader.read_u8().unwrap(), 0x0C);
//! assert_eq!(reader.read_i32().unwrap(), -1);
//! assert_eq!(reader.read_string().unwrap(), "rshwFormat");
//! assert!(reader.is_empty());
//! ```

use crate::error::NrbfError;

/// Longest valid varint length prefix.
const MAX_PREFIX_BYTES: usize = 5;

/// Appends little-endian values to a growable buffer.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Write a 7-bit varint length.
    pub fn write_length_prefix(&mut self, mut length: usize) {
        loop {
            if length < 0x80 {
                self.bytes.push(length as u8);
                return;
            }
            self.bytes.push((length as u8 & 0x7F) | 0x80);
            length >>= 7;
        }
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_length_prefix(value.len());
        self.bytes.extend_from_slice(value.as_bytes());
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the writer and return the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads little-endian values from a byte slice, tracking the offset.
///
/// # Invariants
/// - `position <= data.len()`
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Take the next `count` bytes.
    ///
    /// # Errors
    /// `UnexpectedEof` if fewer than `count` bytes remain.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], NrbfError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(NrbfError::UnexpectedEof {
                offset: self.position,
                needed: count - remaining,
            });
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], NrbfError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, NrbfError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32, NrbfError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    /// Read a 7-bit varint length.
    ///
    /// # Errors
    /// - `UnexpectedEof` if the prefix is cut off
    /// - `InvalidLengthPrefix` if it runs past 5 bytes or exceeds `i32::MAX`
    pub fn read_length_prefix(&mut self) -> Result<usize, NrbfError> {
        let start = self.position;
        let mut value: u64 = 0;

        for index in 0..MAX_PREFIX_BYTES {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << (7 * index);
            if byte & 0x80 == 0 {
                if value > i32::MAX as u64 {
                    break;
                }
                return Ok(value as usize);
            }
        }

        Err(NrbfError::InvalidLengthPrefix { offset: start })
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, NrbfError> {
        let length = self.read_length_prefix()?;
        let start = self.position;
        let bytes = self.read_bytes(length)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| NrbfError::InvalidUtf8 { offset: start })
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }
}
