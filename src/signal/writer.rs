//! Writer implementation for signal containers
//!
//! Records are appended one at a time; the header is written when the writer
//! is created.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use zstd::Encoder as ZstdEncoder;

use super::{SignalHeader, SignalRead, SignalSink};
use crate::error::{Result, WriteError};

/// Default zstd compression level for sample payloads
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Append-only writer for signal containers
pub struct SignalWriter<W: Write> {
    /// The underlying writer for output
    inner: W,

    /// Header written at the start of the container
    header: SignalHeader,

    /// zstd level used when the header enables compression
    compression_level: i32,

    /// Reusable buffer holding little-endian samples
    sbuf: Vec<u8>,

    /// Number of records written so far
    num_records: usize,
}
impl SignalWriter<BufWriter<File>> {
    /// Creates a new container at `path`
    ///
    /// With `overwrite` set any existing file at `path` is deleted first;
    /// otherwise an existing file is reported as [`WriteError::OutputCollision`].
    pub fn create<P: AsRef<Path>>(path: P, header: SignalHeader, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if overwrite {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(WriteError::OutputCollision(path.to_path_buf()).into());
            }
            Err(e) => return Err(e.into()),
        };
        Self::new(BufWriter::new(file), header)
    }
}
impl<W: Write> SignalWriter<W> {
    /// Creates a writer and immediately writes the header
    pub fn new(mut inner: W, header: SignalHeader) -> Result<Self> {
        header.write_bytes(&mut inner)?;
        Ok(Self {
            inner,
            header,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            sbuf: Vec::new(),
            num_records: 0,
        })
    }

    #[must_use]
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    #[must_use]
    pub fn header(&self) -> SignalHeader {
        self.header
    }

    #[must_use]
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// Appends a read to the container
    pub fn write_read(&mut self, read: &SignalRead) -> Result<()> {
        self.sbuf.clear();
        for &sample in &read.signal {
            self.sbuf.write_i16::<LittleEndian>(sample)?;
        }
        let payload = if self.header.compressed {
            let mut encoder = ZstdEncoder::new(Vec::new(), self.compression_level)?;
            encoder.write_all(&self.sbuf)?;
            encoder.finish()?
        } else {
            std::mem::take(&mut self.sbuf)
        };

        self.inner.write_all(read.read_id.as_bytes())?;
        self.inner.write_u8(read.end_reason.code())?;
        self.inner.write_u8(u8::from(read.end_reason_forced))?;
        self.inner.write_u16::<LittleEndian>(read.channel)?;
        self.inner.write_u8(read.well)?;
        self.inner.write_u32::<LittleEndian>(read.read_number)?;
        self.inner.write_u64::<LittleEndian>(read.start_sample)?;
        self.inner.write_f32::<LittleEndian>(read.median_before)?;
        self.inner.write_f32::<LittleEndian>(read.calibration_offset)?;
        self.inner.write_f32::<LittleEndian>(read.calibration_scale)?;
        self.inner.write_u64::<LittleEndian>(read.signal.len() as u64)?;
        self.inner.write_u64::<LittleEndian>(payload.len() as u64)?;
        self.inner.write_all(&payload)?;

        if !self.header.compressed {
            // hand the buffer back for reuse
            self.sbuf = payload;
        }
        self.num_records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> SignalSink for SignalWriter<W> {
    fn write_read(&mut self, read: &SignalRead) -> Result<()> {
        SignalWriter::write_read(self, read)
    }

    fn flush(&mut self) -> Result<()> {
        SignalWriter::flush(self)
    }
}
