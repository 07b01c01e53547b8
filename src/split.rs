//! Splitting raw signal at detected boundaries
//!
//! Every input container is processed on its own and produces one output
//! container holding the two halves of each split read, plus manifests linking
//! the new read ids back to the original:
//!
//! - `<stem><suffix>.rsig` with the derived reads
//! - `<stem><suffix>.txt`, tab separated `read_id read_id_left read_id_right`
//! - `<stem><suffix>_pair_ids.txt`, space separated `read_id_left read_id_right`,
//!   only written when at least one read was split
//!
//! Reads without a decision are not copied.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use log::{info, warn};
use sha2::{Digest, Sha256};
use uuid::{Builder, Uuid};

use crate::debug::DebugSink;
use crate::error::WriteError;
use crate::signal::{
    EndReason, MmapReader, SignalHeader, SignalRead, SignalSink, SignalStore, SignalWriter,
};
use crate::{DecisionMap, Result, Side, SplitDecision};

/// Suffix appended to the stem of every input container
pub const SPLIT_SUFFIX: &str = "_split_duplex";

/// Domain separator of the read id derivation
///
/// Changing it changes every derived id.
pub const DERIVATION_VERSION: &[u8] = b"readsplit/read-id/v1";

/// Derives the read id of one half of a split read
///
/// The id is the first 16 bytes of `SHA-256(DERIVATION_VERSION || 0x00 ||
/// read_id || 0x00 || side)` with the UUID version 4 and variant bits set, so
/// the same original id always yields the same pair of ids.
#[must_use]
pub fn derive_read_id(read_id: &str, side: Side) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(DERIVATION_VERSION);
    hasher.update([0u8]);
    hasher.update(read_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(side.as_str().as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Builder::from_random_bytes(bytes).into_uuid()
}

/// One half of a split read together with its lineage
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRead {
    /// Id of the read this half was cut from
    pub parent: Uuid,
    pub side: Side,
    pub read: SignalRead,
}
impl DerivedRead {
    /// Cuts one half out of `original`
    ///
    /// All metadata is copied except the end reason, which no longer applies to
    /// a sub-segment and is reset to unknown. The slice is clamped to the
    /// available samples.
    #[must_use]
    pub fn cut(original: &SignalRead, decision: &SplitDecision, side: Side) -> Self {
        let range = match side {
            Side::Left => &decision.left,
            Side::Right => &decision.right,
        };
        let len = original.signal.len();
        let start = (range.start as usize).min(len);
        let end = (range.end as usize).clamp(start, len);

        let parent = original.read_id;
        let mut read = original.clone();
        read.read_id = derive_read_id(&parent.to_string(), side);
        read.signal = original.signal[start..end].to_vec();
        read.end_reason = EndReason::Unknown;
        read.end_reason_forced = false;

        Self { parent, side, read }
    }
}

/// Settings of the splitting stage
pub struct SplitterOptions<'a> {
    /// Delete existing outputs instead of failing
    pub overwrite: bool,

    /// Suffix appended to input stems to name outputs
    pub suffix: String,

    /// Optional renderer receiving every split read
    pub debug: Option<&'a dyn DebugSink>,
}
impl Default for SplitterOptions<'_> {
    fn default() -> Self {
        Self {
            overwrite: false,
            suffix: SPLIT_SUFFIX.to_string(),
            debug: None,
        }
    }
}

/// Notice logged and reported when a container yields no split reads
pub const NO_PAIRS_NOTICE: &str = "No pairs created";

/// An original read id and the ids of its two halves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lineage {
    pub read_id: Uuid,
    pub left: Uuid,
    pub right: Uuid,
}

/// What became of the pairing manifest of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairsOutcome {
    /// The manifest was written to this path
    Written(PathBuf),
    /// Nothing was split, so no manifest exists
    NoPairsCreated,
}
impl PairsOutcome {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Written(path) => Some(path),
            Self::NoPairsCreated => None,
        }
    }

    /// The notice reported instead of a manifest
    #[must_use]
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::Written(_) => None,
            Self::NoPairsCreated => Some(NO_PAIRS_NOTICE),
        }
    }
}

/// Paths and counts produced for one input container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub lineage: PathBuf,
    pub pairs: PairsOutcome,
    /// Number of reads split in this container
    pub num_split: usize,
}

/// The three files derived from one input container
struct OutputPaths {
    signal: PathBuf,
    lineage: PathBuf,
    pairs: PathBuf,
}
impl OutputPaths {
    fn new(output_dir: &Path, output_stem: &str) -> Self {
        Self {
            signal: output_dir.join(format!("{output_stem}.{}", crate::signal::EXTENSION)),
            lineage: output_dir.join(format!("{output_stem}.txt")),
            pairs: output_dir.join(format!("{output_stem}_pair_ids.txt")),
        }
    }

    /// Clears previous outputs, or refuses to touch them without `overwrite`
    ///
    /// Every path is checked before any is removed.
    fn prepare(&self, overwrite: bool) -> Result<()> {
        let paths = [&self.signal, &self.lineage, &self.pairs];
        if !overwrite {
            if let Some(existing) = paths.into_iter().find(|path| path.exists()) {
                return Err(WriteError::OutputCollision(existing.clone()).into());
            }
            return Ok(());
        }
        for path in paths {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Rewrites signal containers according to a set of split decisions
pub struct SignalSplitter<'a> {
    decisions: &'a DecisionMap,
    selection: HashSet<Uuid>,
    options: SplitterOptions<'a>,
}
impl<'a> SignalSplitter<'a> {
    /// Prepares a splitter for the given decisions
    ///
    /// Decisions keyed by something other than a UUID cannot match any stored
    /// read and are skipped with a warning.
    #[must_use]
    pub fn new(decisions: &'a DecisionMap, options: SplitterOptions<'a>) -> Self {
        let mut selection = HashSet::with_capacity(decisions.len());
        for read_id in decisions.keys() {
            match Uuid::parse_str(read_id) {
                Ok(uuid) => {
                    selection.insert(uuid);
                }
                Err(_) => warn!("Skipping decision for {read_id}: not a UUID"),
            }
        }
        Self {
            decisions,
            selection,
            options,
        }
    }

    /// Splits every input container into `output_dir`
    ///
    /// Returns the number of derived reads written.
    pub fn apply<P: AsRef<Path>>(&self, inputs: &[P], output_dir: &Path) -> Result<usize> {
        fs::create_dir_all(output_dir)?;
        let mut written = 0;
        for input in inputs {
            let summary = self.split_file(input.as_ref(), output_dir)?;
            written += 2 * summary.num_split;
        }
        Ok(written)
    }

    /// Splits the decided reads of `store` into `sink`
    ///
    /// Reads without a decision are skipped. The sink is flushed before
    /// returning the lineage of every split read, in store order.
    pub fn split_reads<S, K>(&self, store: &S, sink: &mut K) -> Result<Vec<Lineage>>
    where
        S: SignalStore + ?Sized,
        K: SignalSink + ?Sized,
    {
        let mut rows = Vec::new();
        for read in store.select(&self.selection, true)? {
            let read = read?;
            let key = read.read_id.to_string();
            let Some(decision) = self.decisions.get(&key) else {
                continue;
            };
            if decision.num_samples() != read.num_samples() as u64 {
                warn!(
                    "Read {} holds {} samples but its decision covers {}",
                    key,
                    read.num_samples(),
                    decision.num_samples()
                );
            }

            let left = DerivedRead::cut(&read, decision, Side::Left);
            let right = DerivedRead::cut(&read, decision, Side::Right);
            sink.write_read(&left.read)?;
            sink.write_read(&right.read)?;

            if let Some(debug) = self.options.debug {
                debug.render(
                    &read.read_id,
                    &read.signal,
                    &left.read.signal,
                    &right.read.signal,
                    decision.boundary(),
                )?;
            }
            rows.push(Lineage {
                read_id: read.read_id,
                left: left.read.read_id,
                right: right.read.read_id,
            });
        }
        sink.flush()?;
        Ok(rows)
    }

    /// Splits the decided reads of one container
    pub fn split_file(&self, input: &Path, output_dir: &Path) -> Result<FileSummary> {
        info!("Splitting {}", input.display());
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let paths = OutputPaths::new(output_dir, &format!("{stem}{}", self.options.suffix));

        let reader = MmapReader::new(input)?;
        paths.prepare(self.options.overwrite)?;
        let mut writer =
            SignalWriter::create(&paths.signal, SignalHeader::default(), self.options.overwrite)?;
        let rows = self.split_reads(&reader, &mut writer)?;

        write_lineage(&paths.lineage, &rows)?;
        let pairs = if rows.is_empty() {
            info!("{NO_PAIRS_NOTICE}");
            PairsOutcome::NoPairsCreated
        } else {
            write_pairs(&paths.pairs, &rows)?;
            info!("Created {} new pairs", rows.len());
            PairsOutcome::Written(paths.pairs)
        };

        Ok(FileSummary {
            input: input.to_path_buf(),
            output: paths.signal,
            lineage: paths.lineage,
            pairs,
            num_split: rows.len(),
        })
    }
}

/// Splits every input container, returning the number of derived reads written
pub fn apply<P: AsRef<Path>>(
    decisions: &DecisionMap,
    inputs: &[P],
    output_dir: &Path,
    overwrite: bool,
    debug: Option<&dyn DebugSink>,
) -> Result<usize> {
    let options = SplitterOptions {
        overwrite,
        debug,
        ..SplitterOptions::default()
    };
    SignalSplitter::new(decisions, options).apply(inputs, output_dir)
}

fn write_lineage(path: &Path, rows: &[Lineage]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(File::create(path)?);
    writer.write_record(["read_id", "read_id_left", "read_id_right"])?;
    for row in rows {
        writer.write_record([
            row.read_id.to_string(),
            row.left.to_string(),
            row.right.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_pairs(path: &Path, rows: &[Lineage]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .from_writer(File::create(path)?);
    writer.write_record(["read_id_left", "read_id_right"])?;
    for row in rows {
        writer.write_record([row.left.to_string(), row.right.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::error::WriteError;
    use crate::Error;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::fs;

    fn original(n: u128, len: usize) -> SignalRead {
        let mut read = SignalRead::new(Uuid::from_u128(n), (0..len as i16).collect());
        read.end_reason = EndReason::SignalPositive;
        read.end_reason_forced = true;
        read.channel = 7;
        read.read_number = n as u32;
        read.start_sample = 1000 * n as u64;
        read
    }

    fn write_input(path: &Path, reads: &[SignalRead]) -> Result<()> {
        let mut writer = SignalWriter::create(path, SignalHeader::default(), false)?;
        for read in reads {
            writer.write_read(read)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn decisions(entries: &[(u128, u64, u64)]) -> DecisionMap {
        entries
            .iter()
            .map(|&(n, boundary, len)| {
                let id = Uuid::from_u128(n).to_string();
                (id.clone(), SplitDecision::at(id, boundary, len))
            })
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<(Uuid, usize, usize, usize, u64)>>,
    }
    impl DebugSink for Recorder {
        fn render(
            &self,
            read_id: &Uuid,
            original: &[i16],
            left: &[i16],
            right: &[i16],
            boundary: u64,
        ) -> crate::Result<()> {
            self.seen.borrow_mut().push((
                *read_id,
                original.len(),
                left.len(),
                right.len(),
                boundary,
            ));
            Ok(())
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let id = "3f8c1d2e-0b4a-4c5d-9e6f-7a8b9c0d1e2f";
        let left = derive_read_id(id, Side::Left);
        let right = derive_read_id(id, Side::Right);
        assert_eq!(left, derive_read_id(id, Side::Left));
        assert_eq!(right, derive_read_id(id, Side::Right));
        assert_ne!(left, right);
        assert_eq!(left.get_version_num(), 4);
        assert_eq!(right.get_version(), Some(uuid::Version::Random));
        assert_ne!(left, derive_read_id("another-read", Side::Left));
    }

    #[test]
    fn test_cut_resets_end_reason() {
        let read = original(1, 100);
        let decision = SplitDecision::at(read.read_id.to_string(), 40, 100);

        let left = DerivedRead::cut(&read, &decision, Side::Left);
        let right = DerivedRead::cut(&read, &decision, Side::Right);
        assert_eq!(left.parent, read.read_id);
        assert_eq!(left.side, Side::Left);
        assert_eq!(left.read.signal, read.signal[..40]);
        assert_eq!(right.read.signal, read.signal[40..]);
        assert_eq!(left.read.end_reason, EndReason::Unknown);
        assert!(!right.read.end_reason_forced);
        assert_eq!(left.read.channel, read.channel);
        assert_eq!(right.read.start_sample, read.start_sample);
        assert_eq!(
            left.read.read_id,
            derive_read_id(&read.read_id.to_string(), Side::Left)
        );
    }

    #[test]
    fn test_cut_clamps_to_signal() {
        let read = original(1, 50);
        let decision = SplitDecision::at(read.read_id.to_string(), 80, 100);
        let left = DerivedRead::cut(&read, &decision, Side::Left);
        let right = DerivedRead::cut(&read, &decision, Side::Right);
        assert_eq!(left.read.signal.len(), 50);
        assert!(right.read.signal.is_empty());
    }

    #[test]
    fn test_split_file_outputs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("batch0.rsig");
        let reads = vec![original(1, 100), original(2, 60), original(3, 80)];
        write_input(&input, &reads)?;
        let before = fs::read(&input)?;

        let decisions = decisions(&[(1, 40, 100), (3, 30, 80), (9, 10, 20)]);
        let recorder = Recorder::default();
        let options = SplitterOptions {
            debug: Some(&recorder),
            ..SplitterOptions::default()
        };
        let splitter = SignalSplitter::new(&decisions, options);
        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir)?;
        let summary = splitter.split_file(&input, &out_dir)?;

        assert_eq!(summary.num_split, 2);
        assert_eq!(summary.output, out_dir.join("batch0_split_duplex.rsig"));
        assert_eq!(fs::read(&input)?, before);

        let written = MmapReader::new(&summary.output)?
            .reads()
            .collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(written.len(), 4);
        let left1 = derive_read_id(&Uuid::from_u128(1).to_string(), Side::Left);
        let right1 = derive_read_id(&Uuid::from_u128(1).to_string(), Side::Right);
        assert_eq!(written[0].read_id, left1);
        assert_eq!(written[0].signal, reads[0].signal[..40]);
        assert_eq!(written[1].read_id, right1);
        assert_eq!(written[1].signal, reads[0].signal[40..]);
        assert_eq!(written[3].signal, reads[2].signal[30..]);
        assert!(written
            .iter()
            .all(|r| r.read_id != Uuid::from_u128(2) && r.end_reason == EndReason::Unknown));

        let lineage = fs::read_to_string(&summary.lineage)?;
        let lines: Vec<_> = lineage.lines().collect();
        assert_eq!(lines[0], "read_id\tread_id_left\tread_id_right");
        assert_eq!(lines[1], format!("{}\t{left1}\t{right1}", Uuid::from_u128(1)));
        assert_eq!(lines.len(), 3);
        assert!(!lineage.contains(&Uuid::from_u128(2).to_string()));

        assert_eq!(summary.pairs.notice(), None);
        let pairs = fs::read_to_string(summary.pairs.path().unwrap())?;
        let lines: Vec<_> = pairs.lines().collect();
        assert_eq!(lines[0], "read_id_left read_id_right");
        assert_eq!(lines[1], format!("{left1} {right1}"));
        assert_eq!(lines.len(), 3);

        let seen = recorder.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Uuid::from_u128(1), 100, 40, 60, 40));
        Ok(())
    }

    #[test]
    fn test_file_without_decisions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("quiet.rsig");
        write_input(&input, &[original(1, 10), original(2, 10)])?;

        let decisions = decisions(&[(7, 5, 10)]);
        let splitter = SignalSplitter::new(&decisions, SplitterOptions::default());
        let summary = splitter.split_file(&input, dir.path())?;

        assert_eq!(summary.num_split, 0);
        assert_eq!(summary.pairs, PairsOutcome::NoPairsCreated);
        assert_eq!(summary.pairs.notice(), Some("No pairs created"));
        assert!(!dir.path().join("quiet_split_duplex_pair_ids.txt").exists());
        assert_eq!(MmapReader::new(&summary.output)?.num_records(), 0);
        assert_eq!(
            fs::read_to_string(&summary.lineage)?.trim_end(),
            "read_id\tread_id_left\tread_id_right"
        );
        Ok(())
    }

    #[test]
    fn test_apply_counts_and_overwrite() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let in_dir = dir.path().join("in");
        fs::create_dir_all(&in_dir)?;
        write_input(&in_dir.join("a.rsig"), &[original(1, 10)])?;
        write_input(&in_dir.join("b.rsig"), &[original(2, 10), original(3, 10)])?;
        let inputs = crate::signal::find_signal_files(&in_dir)?;
        let out_dir = dir.path().join("out");

        let decisions = decisions(&[(1, 5, 10), (3, 4, 10)]);
        assert_eq!(apply(&decisions, &inputs, &out_dir, false, None)?, 4);

        let again = apply(&decisions, &inputs, &out_dir, false, None);
        assert!(matches!(
            again,
            Err(Error::WriteError(WriteError::OutputCollision(_)))
        ));

        assert_eq!(apply(&decisions, &inputs, &out_dir, true, None)?, 4);
        Ok(())
    }

    #[test]
    fn test_non_uuid_decisions_ignored() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("a.rsig");
        write_input(&input, &[original(1, 10)])?;

        let mut decisions = decisions(&[(1, 5, 10)]);
        decisions.insert(
            "not-a-uuid".to_string(),
            SplitDecision::at("not-a-uuid", 3, 10),
        );
        let written = apply(&decisions, &[input], &dir.path().join("out"), false, None)?;
        assert_eq!(written, 2);
        Ok(())
    }

    #[derive(Default)]
    struct MemoryStore {
        reads: Vec<SignalRead>,
    }
    impl SignalStore for MemoryStore {
        fn select<'a>(
            &'a self,
            selection: &'a HashSet<Uuid>,
            missing_ok: bool,
        ) -> crate::Result<Box<dyn Iterator<Item = crate::Result<SignalRead>> + 'a>> {
            if !missing_ok {
                if let Some(id) = selection
                    .iter()
                    .find(|id| !self.reads.iter().any(|r| r.read_id == **id))
                {
                    return Err(crate::ReadError::MissingRead(id.to_string()).into());
                }
            }
            Ok(Box::new(
                self.reads
                    .iter()
                    .filter(move |r| selection.contains(&r.read_id))
                    .cloned()
                    .map(Ok),
            ))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        reads: Vec<SignalRead>,
        flushed: bool,
    }
    impl SignalSink for MemorySink {
        fn write_read(&mut self, read: &SignalRead) -> crate::Result<()> {
            self.reads.push(read.clone());
            Ok(())
        }

        fn flush(&mut self) -> crate::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    #[test]
    fn test_split_reads_in_memory() -> Result<()> {
        let store = MemoryStore {
            reads: vec![original(1, 30), original(2, 30), original(3, 30)],
        };
        let decisions = decisions(&[(3, 10, 30), (1, 20, 30), (8, 5, 30)]);
        let splitter = SignalSplitter::new(&decisions, SplitterOptions::default());

        let mut sink = MemorySink::default();
        let rows = splitter.split_reads(&store, &mut sink)?;

        assert!(sink.flushed);
        let parents: Vec<_> = rows.iter().map(|row| row.read_id).collect();
        assert_eq!(parents, vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
        assert_eq!(sink.reads.len(), 4);
        assert_eq!(sink.reads[0].read_id, rows[0].left);
        assert_eq!(sink.reads[0].signal, store.reads[0].signal[..20]);
        assert_eq!(sink.reads[3].read_id, rows[1].right);
        assert_eq!(sink.reads[3].signal, store.reads[2].signal[10..]);
        Ok(())
    }

    #[test]
    fn test_overwrite_clears_stale_pairs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("a.rsig");
        write_input(&input, &[original(1, 10)])?;
        let out_dir = dir.path().join("out");
        let pairs = out_dir.join("a_split_duplex_pair_ids.txt");

        apply(&decisions(&[(1, 5, 10)]), &[&input], &out_dir, false, None)?;
        assert!(pairs.exists());

        let written = apply(&DecisionMap::new(), &[&input], &out_dir, true, None)?;
        assert_eq!(written, 0);
        assert!(!pairs.exists());
        assert_eq!(
            fs::read_to_string(out_dir.join("a_split_duplex.txt"))?.trim_end(),
            "read_id\tread_id_left\tread_id_right"
        );
        Ok(())
    }

    #[test]
    fn test_existing_manifest_is_a_collision() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("a.rsig");
        write_input(&input, &[original(1, 10)])?;
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&out_dir)?;
        let lineage = out_dir.join("a_split_duplex.txt");
        fs::write(&lineage, "kept")?;

        let result = apply(&decisions(&[(1, 5, 10)]), &[&input], &out_dir, false, None);
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::OutputCollision(path))) if path == lineage
        ));
        assert_eq!(fs::read_to_string(&lineage)?, "kept");
        assert!(!out_dir.join("a_split_duplex.rsig").exists());
        Ok(())
    }
}
