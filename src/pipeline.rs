//! End-to-end run: detect over a record stream, then split signal containers

use std::path::PathBuf;

use log::info;

use crate::debug::{DebugSink, SvgDebugSink};
use crate::parallel::{schedule, SchedulerConfig};
use crate::signal::find_signal_files;
use crate::split::{SignalSplitter, SplitterOptions};
use crate::{ReadRecord, Result, SelfAligner, SplitDetector};

/// Inputs and outputs of a full run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory searched recursively for signal containers
    pub signal_input_dir: PathBuf,

    /// Directory receiving split containers and manifests, created if missing
    pub signal_output_dir: PathBuf,

    /// Replace existing outputs instead of failing
    pub overwrite: bool,

    /// Directory receiving one SVG per split read
    pub debug_dir: Option<PathBuf>,

    pub scheduler: SchedulerConfig,
}
impl RunOptions {
    #[must_use]
    pub fn new(
        signal_input_dir: impl Into<PathBuf>,
        signal_output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            signal_input_dir: signal_input_dir.into(),
            signal_output_dir: signal_output_dir.into(),
            overwrite: false,
            debug_dir: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records assessed by the detector
    pub assessed: usize,
    /// Records with an accepted split decision
    pub decided: usize,
    /// Derived reads written to the output containers
    pub written: usize,
}

pub fn run<I, A>(
    records: I,
    detector: &SplitDetector<A>,
    options: &RunOptions,
) -> Result<RunSummary>
where
    I: IntoIterator<Item = Result<ReadRecord>>,
    A: SelfAligner,
{
    let detection = schedule(records, detector, &options.scheduler)?;

    std::fs::create_dir_all(&options.signal_output_dir)?;
    let inputs = find_signal_files(&options.signal_input_dir)?;
    info!(
        "Found {} signal files in {}",
        inputs.len(),
        options.signal_input_dir.display()
    );

    let sink = options
        .debug_dir
        .as_ref()
        .map(SvgDebugSink::new)
        .transpose()?;
    let splitter = SignalSplitter::new(
        &detection.decisions,
        SplitterOptions {
            overwrite: options.overwrite,
            debug: sink.as_ref().map(|s| s as &dyn DebugSink),
            ..SplitterOptions::default()
        },
    );
    let written = splitter.apply(&inputs, &options.signal_output_dir)?;

    Ok(RunSummary {
        assessed: detection.progress.processed,
        decided: detection.decisions.len(),
        written,
    })
}
