//! Header module for raw signal containers
//!
//! Every container starts with a fixed 32 byte header identifying the format and
//! recording how sample payloads are encoded.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Write};

use crate::error::{HeaderError, Result};

/// Current magic number: "RSIG" in ASCII (in little-endian byte order)
#[allow(clippy::unreadable_literal)]
const MAGIC: u32 = 0x47495352;

/// Current format version of the signal container
const FORMAT: u8 = 1;

/// Size of the header in bytes
pub const SIZE_HEADER: usize = 32;

/// Reserved bytes in the header
pub const RESERVED: [u8; 26] = [42; 26];

/// Header structure for raw signal containers
///
/// Layout (little-endian):
/// - magic, 4 bytes
/// - format version, 1 byte
/// - compression flag, 1 byte
/// - reserved, 26 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalHeader {
    /// Magic number to identify the file format
    pub magic: u32,

    /// Version of the file format
    pub format: u8,

    /// Whether sample payloads are zstd compressed
    pub compressed: bool,

    /// Reserve remaining bytes for future use
    pub reserved: [u8; 26],
}
impl Default for SignalHeader {
    fn default() -> Self {
        Self::new(true)
    }
}
impl SignalHeader {
    #[must_use]
    pub fn new(compressed: bool) -> Self {
        Self {
            magic: MAGIC,
            format: FORMAT,
            compressed,
            reserved: RESERVED,
        }
    }

    /// Parses a header from a fixed-size byte array
    ///
    /// # Errors
    ///
    /// Returns an error if the magic number or format version is not recognised.
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagicNumber(magic).into());
        }
        let format = buffer[4];
        if format != FORMAT {
            return Err(HeaderError::InvalidFormatVersion(format).into());
        }
        let compressed = buffer[5] != 0;
        let mut reserved = [0u8; 26];
        reserved.copy_from_slice(&buffer[6..32]);
        Ok(Self {
            magic,
            format,
            compressed,
            reserved,
        })
    }

    /// Parses a header from the start of an arbitrarily sized buffer
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < SIZE_HEADER {
            return Err(HeaderError::InvalidSize(buffer.len(), SIZE_HEADER).into());
        }
        let mut bytes = [0u8; SIZE_HEADER];
        bytes.copy_from_slice(&buffer[..SIZE_HEADER]);
        Self::from_bytes(&bytes)
    }

    /// Writes the header to a writer
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], self.magic);
        buffer[4] = self.format;
        buffer[5] = u8::from(self.compressed);
        buffer[6..32].copy_from_slice(&self.reserved);
        writer.write_all(&buffer)?;
        Ok(())
    }

    /// Reads a header from a reader
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buffer)?;
        Self::from_bytes(&buffer)
    }
}
