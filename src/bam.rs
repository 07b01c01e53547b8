//! Basecalled record stream over unaligned BAM/SAM
//!
//! Only the tags needed to place a split in signal space are read:
//! `mv` (move table), `ts` (trimmed samples) and `ns` (sample count).

use std::path::Path;

use rust_htslib::bam::{self, record::Aux, Read};
use rust_htslib::errors::Error as HtslibError;

use crate::error::{Result, StreamError};
use crate::ReadRecord;

/// Sequential reader yielding one [`ReadRecord`] per alignment record
pub struct BamRecordStream {
    reader: bam::Reader,
    record: bam::Record,
}
impl BamRecordStream {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = bam::Reader::from_path(path.as_ref()).map_err(StreamError::from)?;
        Ok(Self {
            reader,
            record: bam::Record::new(),
        })
    }

    /// Decompression threads used by htslib
    pub fn set_threads(&mut self, threads: usize) -> Result<()> {
        self.reader
            .set_threads(threads)
            .map_err(StreamError::from)?;
        Ok(())
    }

    fn convert(&self) -> Result<ReadRecord> {
        let read_id = std::str::from_utf8(self.record.qname())
            .map_err(|_| StreamError::InvalidReadName)?
            .to_string();
        let sequence = self.record.seq().as_bytes();

        let moves = match self.record.aux(b"mv") {
            Ok(Aux::ArrayU8(values)) => Some(values.iter().collect()),
            Ok(Aux::ArrayI8(values)) => Some(values.iter().map(|v| v as u8).collect()),
            Ok(_) => return Err(invalid_tag("mv", &read_id)),
            Err(HtslibError::BamAuxTagNotFound) => None,
            Err(e) => return Err(StreamError::from(e).into()),
        };
        let trim_offset = self.integer_tag(b"ts", &read_id)?;
        let num_samples = self.integer_tag(b"ns", &read_id)?;

        Ok(ReadRecord {
            read_id,
            sequence,
            moves,
            trim_offset,
            num_samples,
        })
    }

    /// Reads an unsigned integer tag of any width
    fn integer_tag(&self, tag: &[u8; 2], read_id: &str) -> Result<Option<u64>> {
        let value = match self.record.aux(tag) {
            Ok(Aux::U8(v)) => u64::from(v),
            Ok(Aux::U16(v)) => u64::from(v),
            Ok(Aux::U32(v)) => u64::from(v),
            Ok(Aux::I8(v)) => u64::try_from(v).map_err(|_| invalid_tag(tag, read_id))?,
            Ok(Aux::I16(v)) => u64::try_from(v).map_err(|_| invalid_tag(tag, read_id))?,
            Ok(Aux::I32(v)) => u64::try_from(v).map_err(|_| invalid_tag(tag, read_id))?,
            Ok(_) => return Err(invalid_tag(tag, read_id)),
            Err(HtslibError::BamAuxTagNotFound) => return Ok(None),
            Err(e) => return Err(StreamError::from(e).into()),
        };
        Ok(Some(value))
    }
}
impl Iterator for BamRecordStream {
    type Item = Result<ReadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read(&mut self.record)? {
            Ok(()) => Some(self.convert()),
            Err(e) => Some(Err(StreamError::from(e).into())),
        }
    }
}

fn invalid_tag<T: AsRef<[u8]> + ?Sized>(tag: &T, read_id: &str) -> crate::Error {
    StreamError::InvalidTagType {
        tag: String::from_utf8_lossy(tag.as_ref()).into_owned(),
        read_id: read_id.to_string(),
    }
    .into()
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    const SAM: &str = "@HD\tVN:1.6\tSO:unknown\n\
r1\t4\t*\t0\t0\t*\t*\t0\t0\tACGTAC\t*\tmv:B:C,5,1,0,1\tts:i:12\tns:i:400\n\
r2\t4\t*\t0\t0\t*\t*\t0\t0\tTTGG\t*\tts:i:0\n\
r3\t4\t*\t0\t0\t*\t*\t0\t0\tGG\t*\tmv:Z:oops\n";

    fn write_sam(dir: &Path) -> Result<std::path::PathBuf> {
        let path = dir.join("calls.sam");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(SAM.as_bytes())?;
        Ok(path)
    }

    #[test]
    fn test_reads_tags() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut stream = BamRecordStream::from_path(write_sam(dir.path())?)?;

        let first = stream.next().unwrap()?;
        assert_eq!(first.read_id, "r1");
        assert_eq!(first.sequence, b"ACGTAC");
        assert_eq!(first.moves, Some(vec![5, 1, 0, 1]));
        assert_eq!(first.trim_offset, Some(12));
        assert_eq!(first.num_samples, Some(400));

        let second = stream.next().unwrap()?;
        assert_eq!(second.moves, None);
        assert_eq!(second.trim_offset, Some(0));
        assert_eq!(second.num_samples, None);

        assert!(matches!(
            stream.next(),
            Some(Err(crate::Error::StreamError(
                StreamError::InvalidTagType { .. }
            )))
        ));
        assert!(stream.next().is_none());
        Ok(())
    }
}
