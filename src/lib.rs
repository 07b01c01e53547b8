//! # readsplit
//!
//! Finds nanopore reads in which the template and its reverse complement were
//! sequenced back to back, and splits the raw signal of each such read into two
//! new reads.
//!
//! Work happens in two stages:
//!
//! 1. [`parallel::schedule`] pulls basecalled [`ReadRecord`]s in batches and runs
//!    the [`SplitDetector`] on every record, collecting a [`DecisionMap`].
//! 2. [`split::SignalSplitter`] rewrites every `.rsig` container, emitting the
//!    two halves of each decided read under derived ids together with lineage
//!    and pairing manifests.
//!
//! [`pipeline::run`] chains both stages.

pub mod align;
#[cfg(feature = "htslib")]
pub mod bam;
pub mod debug;
pub mod detect;
mod error;
pub mod parallel;
pub mod pipeline;
mod record;
pub mod signal;
pub mod split;

pub use align::{RevCompAligner, SelfAligner};
pub use detect::{Rejection, SplitConfig, SplitDetector, Threshold};
pub use error::{Error, HeaderError, ReadError, Result, StreamError, WriteError};
pub use record::{DecisionMap, ReadRecord, SelfMatch, Side, SplitDecision};

#[cfg(test)]
mod testing {

    use super::*;
    use crate::signal::{MmapReader, SignalHeader, SignalRead, SignalWriter};
    use crate::split::derive_read_id;
    use anyhow::Result;
    use nucgen::Sequence;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    /// Seeded random bases
    fn bases(n: usize, seed: u64) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut sequence = Sequence::new();
        sequence.fill_buffer(&mut rng, n);
        sequence.bytes().to_vec()
    }

    fn revcomp(seq: &[u8]) -> Vec<u8> {
        seq.iter()
            .rev()
            .map(|b| match b {
                b'A' => b'T',
                b'C' => b'G',
                b'G' => b'C',
                _ => b'A',
            })
            .collect()
    }

    #[test]
    fn test_fused_read_is_split() -> Result<()> {
        let template = bases(100, 17);
        let sequence = [template.clone(), revcomp(&template)].concat();
        let read_id = Uuid::from_u128(0xfeed);

        // stride 5, one base per timestep, 10 trimmed samples
        let moves = [vec![5u8], vec![1u8; sequence.len()]].concat();
        let num_samples = 10 + 5 * sequence.len() as u64;
        let record = ReadRecord::new(read_id.to_string(), sequence)
            .with_moves(moves)
            .with_trim_offset(10)
            .with_num_samples(num_samples);
        let unrelated = ReadRecord::new(Uuid::from_u128(2).to_string(), bases(200, 99))
            .with_moves([vec![5u8], vec![1u8; 200]].concat())
            .with_trim_offset(10)
            .with_num_samples(num_samples);

        let detector = SplitDetector::new(RevCompAligner::default(), SplitConfig::default());
        let detection = parallel::schedule(
            vec![Ok(record), Ok(unrelated)],
            &detector,
            &parallel::SchedulerConfig::default().threads(2),
        )?;
        assert_eq!(detection.progress.processed, 2);
        assert_eq!(detection.decisions.len(), 1);
        let decision = &detection.decisions[&read_id.to_string()];
        assert_eq!(decision.left, 0..510);
        assert_eq!(decision.right, 510..1010);

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("reads.rsig");
        let mut writer = SignalWriter::create(&input, SignalHeader::default(), false)?;
        let signal: Vec<i16> = (0..1010).map(|i| (i % 300) as i16).collect();
        writer.write_read(&SignalRead::new(read_id, signal.clone()))?;
        writer.write_read(&SignalRead::new(Uuid::from_u128(2), signal.clone()))?;
        writer.flush()?;

        let written = split::apply(&detection.decisions, &[input], dir.path(), false, None)?;
        assert_eq!(written, 2);

        let reader = MmapReader::new(dir.path().join("reads_split_duplex.rsig"))?;
        let left = reader.get(&derive_read_id(&read_id.to_string(), Side::Left))?;
        let right = reader.get(&derive_read_id(&read_id.to_string(), Side::Right))?;
        assert_eq!(left.signal, signal[..510]);
        assert_eq!(right.signal, signal[510..]);
        assert_eq!(
            [left.signal, right.signal].concat(),
            signal,
            "halves must reassemble the original signal"
        );
        Ok(())
    }
}
