//! Batched parallel detection over a record stream
//!
//! Records are pulled from the stream in fixed-size batches. Each batch is split
//! into contiguous chunks, one per worker thread, and every record in a chunk is
//! assessed independently. All workers of a batch are joined before their
//! decisions are merged, so no record of the next batch is touched until the
//! current batch is complete.

use log::{info, warn};

use crate::{DecisionMap, ReadRecord, Result, SelfAligner, SplitDecision, SplitDetector};

/// Default number of records pulled from the stream per batch
pub const BATCH_SIZE: usize = 5000;

/// Controls how detection is distributed over worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads (`0` uses every available CPU)
    pub threads: usize,

    /// Number of records per batch
    pub batch_size: usize,

    /// Stop pulling batches once more than this many decisions were made
    pub max_decisions: Option<usize>,
}
impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            batch_size: BATCH_SIZE,
            max_decisions: None,
        }
    }
}
impl SchedulerConfig {
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn max_decisions(mut self, max_decisions: Option<usize>) -> Self {
        self.max_decisions = max_decisions;
        self
    }

    /// The number of worker threads actually used
    ///
    /// Requests are capped at the number of available CPUs.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads.min(num_cpus::get())
        }
    }
}

/// Running totals reported after every batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Records assessed so far
    pub processed: usize,
    /// Records with a split decision so far
    pub decided: usize,
    /// Batches merged so far
    pub batches: usize,
}
impl Progress {
    /// Fraction of processed records that were split
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.decided as f64 / self.processed as f64
        }
    }

    fn record_batch(&mut self, batch_len: usize, decided: usize) {
        self.processed += batch_len;
        self.decided = decided;
        self.batches += 1;
    }
}

/// The outcome of detection over a whole stream
#[derive(Debug, Default)]
pub struct Detection {
    pub decisions: DecisionMap,
    pub progress: Progress,
}

/// Runs detection over a record stream, batch by batch
///
/// Batches are processed in stream order. When `max_decisions` is set and the
/// number of decisions exceeds it after a batch is merged, no further batches
/// are pulled; the batch in flight is always merged in full.
pub fn schedule<I, A>(
    records: I,
    detector: &SplitDetector<A>,
    config: &SchedulerConfig,
) -> Result<Detection>
where
    I: IntoIterator<Item = Result<ReadRecord>>,
    A: SelfAligner,
{
    let num_threads = config.num_threads();
    let batch_size = config.batch_size.max(1);

    let mut records = records.into_iter();
    let mut detection = Detection::default();
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        batch.clear();
        for record in records.by_ref().take(batch_size) {
            batch.push(record?);
        }
        if batch.is_empty() {
            break;
        }

        for decision in detect_batch(&batch, detector, num_threads) {
            if let Some(previous) = detection
                .decisions
                .insert(decision.read_id.clone(), decision)
            {
                warn!(
                    "Read {} seen more than once; keeping the latest decision",
                    previous.read_id
                );
            }
        }
        detection
            .progress
            .record_batch(batch.len(), detection.decisions.len());

        let progress = detection.progress;
        info!(
            "Split/Processed reads: {}/{} ({:.2}%)",
            progress.decided,
            progress.processed,
            100.0 * progress.fraction()
        );

        if let Some(max) = config.max_decisions {
            if detection.decisions.len() > max {
                info!(
                    "Reached {} split decisions (limit {}); not reading further",
                    detection.decisions.len(),
                    max
                );
                break;
            }
        }
    }

    info!("Finished finding breakpoints.");
    Ok(detection)
}

/// Assesses every record of a batch across `num_threads` workers
///
/// Returns only once every worker has finished.
fn detect_batch<A: SelfAligner>(
    batch: &[ReadRecord],
    detector: &SplitDetector<A>,
    num_threads: usize,
) -> Vec<SplitDecision> {
    let records_per_thread = batch.len().div_ceil(num_threads.max(1));

    std::thread::scope(|scope| {
        let handles: Vec<_> = batch
            .chunks(records_per_thread)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .filter_map(|record| detector.detect(record))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("Error joining detection worker"))
            .collect()
    })
}
