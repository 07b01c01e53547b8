//! # signal
//!
//! `*.rsig` files hold raw nanopore signal, one variable-length record per read.
//!
//! A container is a 32 byte [`SignalHeader`] followed by records laid out as
//! (little-endian):
//!
//! | field                | bytes |
//! |----------------------|-------|
//! | read id (UUID)       | 16    |
//! | end reason           | 1     |
//! | end reason forced    | 1     |
//! | channel              | 2     |
//! | well                 | 1     |
//! | read number          | 4     |
//! | start sample         | 8     |
//! | median before        | 4     |
//! | calibration offset   | 4     |
//! | calibration scale    | 4     |
//! | sample count         | 8     |
//! | payload length       | 8     |
//! | payload              | n     |
//!
//! The payload holds `i16` samples, zstd compressed when the header says so.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use readsplit::signal::{MmapReader, SignalHeader, SignalRead, SignalWriter};
//! use uuid::Uuid;
//!
//! let mut writer = SignalWriter::create("reads.rsig", SignalHeader::default(), false).unwrap();
//! let read = SignalRead::new(Uuid::nil(), vec![10, 20, 30]);
//! writer.write_read(&read).unwrap();
//! writer.flush().unwrap();
//!
//! let reader = MmapReader::new("reads.rsig").unwrap();
//! assert_eq!(reader.num_records(), 1);
//! ```

mod header;
mod reader;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use auto_impl::auto_impl;
use hashbrown::HashSet;
use uuid::Uuid;

use crate::{error::ReadError, Result};

pub use header::{SignalHeader, SIZE_HEADER};
pub use reader::MmapReader;
pub use writer::SignalWriter;


/// File extension of signal containers
pub const EXTENSION: &str = "rsig";

/// Size of the fixed part of a record preceding its payload
pub const SIZE_RECORD_HEADER: usize = 61;

/// Why the sequencer stopped acquiring a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndReason {
    #[default]
    Unknown,
    MuxChange,
    UnblockMuxChange,
    DataServiceUnblockMuxChange,
    SignalPositive,
    SignalNegative,
}
impl EndReason {
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Self::Unknown,
            1 => Self::MuxChange,
            2 => Self::UnblockMuxChange,
            3 => Self::DataServiceUnblockMuxChange,
            4 => Self::SignalPositive,
            5 => Self::SignalNegative,
            x => return Err(ReadError::InvalidEndReason(x).into()),
        })
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::MuxChange => 1,
            Self::UnblockMuxChange => 2,
            Self::DataServiceUnblockMuxChange => 3,
            Self::SignalPositive => 4,
            Self::SignalNegative => 5,
        }
    }
}

/// A single read of raw signal with its acquisition metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRead {
    pub read_id: Uuid,
    pub end_reason: EndReason,
    pub end_reason_forced: bool,
    pub channel: u16,
    pub well: u8,
    pub read_number: u32,
    pub start_sample: u64,
    pub median_before: f32,
    pub calibration_offset: f32,
    pub calibration_scale: f32,
    pub signal: Vec<i16>,
}
impl SignalRead {
    /// Creates a read with default acquisition metadata
    #[must_use]
    pub fn new(read_id: Uuid, signal: Vec<i16>) -> Self {
        Self {
            read_id,
            end_reason: EndReason::Unknown,
            end_reason_forced: false,
            channel: 0,
            well: 0,
            read_number: 0,
            start_sample: 0,
            median_before: 0.0,
            calibration_offset: 0.0,
            calibration_scale: 1.0,
            signal,
        }
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.signal.len()
    }
}

/// Keyed source of raw signal reads
#[auto_impl(&, Box)]
pub trait SignalStore {
    /// Yields the selected reads in store order
    ///
    /// With `missing_ok` unset, selected ids absent from the store are an error.
    fn select<'a>(
        &'a self,
        selection: &'a HashSet<Uuid>,
        missing_ok: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<SignalRead>> + 'a>>;
}

/// Append-only destination for raw signal reads
#[auto_impl(&mut, Box)]
pub trait SignalSink {
    fn write_read(&mut self, read: &SignalRead) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Recursively lists every signal container below `dir`, sorted by path
pub fn find_signal_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_signal_files(dir.as_ref(), &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_signal_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_signal_files(&path, files)?;
        } else if path.is_file() && path.extension().is_some_and(|ext| ext == EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}
