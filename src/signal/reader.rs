//! Memory-mapped reader for signal containers
//!
//! Opening a container walks the fixed part of every record once to build an
//! index of read ids and byte offsets. Payloads are only decoded when a read is
//! requested.

use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use hashbrown::{HashMap, HashSet};
use memmap2::Mmap;
use uuid::Uuid;
use zstd::Decoder;

use super::{
    EndReason, SignalHeader, SignalRead, SignalStore, SIZE_HEADER, SIZE_RECORD_HEADER,
};
use crate::error::{ReadError, Result};

/// Location of one record inside the mapped file
#[derive(Debug, Clone)]
struct RecordSpan {
    read_id: Uuid,
    /// Byte range of the fixed record header
    meta: Range<usize>,
    /// Byte range of the sample payload
    payload: Range<usize>,
}

/// A memory-mapped reader for signal containers
pub struct MmapReader {
    /// Path the container was opened from
    path: PathBuf,

    /// Memory mapped file contents
    mmap: Mmap,

    /// Container header
    header: SignalHeader,

    /// Records in file order
    spans: Vec<RecordSpan>,

    /// Position of each read id in `spans`
    lookup: HashMap<Uuid, usize>,
}
impl MmapReader {
    /// Opens and indexes a signal container
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be opened or is not a regular file
    /// * The file header is invalid
    /// * A record extends beyond the end of the file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Verify input file is a file before attempting to map
        let file = File::open(path)?;
        if !file.metadata()?.is_file() {
            return Err(ReadError::IncompatibleFile.into());
        }

        // Safety: the file is open and won't be modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        let header = SignalHeader::from_buffer(&mmap)?;

        let mut spans = Vec::new();
        let mut lookup = HashMap::new();
        let mut pos = SIZE_HEADER;
        while pos < mmap.len() {
            let meta_end = pos + SIZE_RECORD_HEADER;
            if meta_end > mmap.len() {
                return Err(ReadError::FileTruncation(pos).into());
            }
            let meta = &mmap[pos..meta_end];
            let read_id = Uuid::from_slice(&meta[0..16])?;
            let payload_len = LittleEndian::read_u64(&meta[53..61]) as usize;
            let payload_end = meta_end
                .checked_add(payload_len)
                .filter(|&end| end <= mmap.len())
                .ok_or(ReadError::FileTruncation(meta_end))?;

            lookup.insert(read_id, spans.len());
            spans.push(RecordSpan {
                read_id,
                meta: pos..meta_end,
                payload: meta_end..payload_end,
            });
            pos = payload_end;
        }

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            spans,
            lookup,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> SignalHeader {
        self.header
    }

    #[must_use]
    pub fn num_records(&self) -> usize {
        self.spans.len()
    }

    /// Read ids in file order
    pub fn ids(&self) -> impl Iterator<Item = &Uuid> {
        self.spans.iter().map(|span| &span.read_id)
    }

    #[must_use]
    pub fn contains(&self, read_id: &Uuid) -> bool {
        self.lookup.contains_key(read_id)
    }

    /// Decodes the read with the given id
    pub fn get(&self, read_id: &Uuid) -> Result<SignalRead> {
        let Some(&idx) = self.lookup.get(read_id) else {
            return Err(ReadError::MissingRead(read_id.to_string()).into());
        };
        self.decode(&self.spans[idx])
    }

    /// Decodes every read in file order
    pub fn reads(&self) -> impl Iterator<Item = Result<SignalRead>> + '_ {
        self.spans.iter().map(move |span| self.decode(span))
    }

    /// Decodes the selected reads in file order
    ///
    /// With `missing_ok` unset, any selected id absent from the container is an
    /// error raised before anything is decoded.
    pub fn select<'a>(
        &'a self,
        selection: &'a HashSet<Uuid>,
        missing_ok: bool,
    ) -> Result<impl Iterator<Item = Result<SignalRead>> + 'a> {
        if !missing_ok {
            if let Some(missing) = selection.iter().find(|id| !self.contains(id)) {
                return Err(ReadError::MissingRead(missing.to_string()).into());
            }
        }
        Ok(self
            .spans
            .iter()
            .filter(move |span| selection.contains(&span.read_id))
            .map(move |span| self.decode(span)))
    }

    fn decode(&self, span: &RecordSpan) -> Result<SignalRead> {
        let meta = &self.mmap[span.meta.clone()];
        let num_samples = LittleEndian::read_u64(&meta[45..53]);

        let payload = &self.mmap[span.payload.clone()];
        let mut bytes = Vec::new();
        let raw = if self.header.compressed {
            Decoder::new(payload)?.read_to_end(&mut bytes)?;
            &bytes[..]
        } else {
            payload
        };
        if raw.len() as u64 != num_samples * 2 {
            return Err(ReadError::PayloadMismatch {
                expected: num_samples,
                got: raw.len(),
            }
            .into());
        }
        let mut signal = vec![0i16; num_samples as usize];
        LittleEndian::read_i16_into(raw, &mut signal);

        Ok(SignalRead {
            read_id: span.read_id,
            end_reason: EndReason::from_code(meta[16])?,
            end_reason_forced: meta[17] != 0,
            channel: LittleEndian::read_u16(&meta[18..20]),
            well: meta[20],
            read_number: LittleEndian::read_u32(&meta[21..25]),
            start_sample: LittleEndian::read_u64(&meta[25..33]),
            median_before: LittleEndian::read_f32(&meta[33..37]),
            calibration_offset: LittleEndian::read_f32(&meta[37..41]),
            calibration_scale: LittleEndian::read_f32(&meta[41..45]),
            signal,
        })
    }
}

impl SignalStore for MmapReader {
    fn select<'a>(
        &'a self,
        selection: &'a HashSet<Uuid>,
        missing_ok: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<SignalRead>> + 'a>> {
        Ok(Box::new(MmapReader::select(self, selection, missing_ok)?))
    }
}
