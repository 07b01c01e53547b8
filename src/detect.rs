//! Split point detection
//!
//! A read holding a template immediately followed by its complement aligns to
//! itself as a hairpin: the reference and query spans of the self-alignment are
//! identical and centred on the junction. The detector accepts such a junction
//! when it sits near the middle of the read and both halves are of comparable
//! length, then translates it from base space into raw sample space using the
//! move table.

use log::debug;

use crate::{ReadRecord, SelfAligner, SplitDecision};

/// Thresholds controlling which self-alignments are accepted as split points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitConfig {
    /// Minimum fraction of the left half covered by the self-alignment
    pub match_threshold: f64,

    /// The midpoint must lie at or after this fraction of the read
    pub left_midpoint_threshold: f64,

    /// The midpoint must lie at or before this fraction of the read
    pub right_midpoint_threshold: f64,

    /// Candidates whose midpoint falls within this fraction of either end are skipped
    pub edge_fraction: f64,

    /// Candidates whose halves differ in length by this factor or more are skipped
    pub max_length_ratio: f64,
}
impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.8,
            left_midpoint_threshold: 0.45,
            right_midpoint_threshold: 0.55,
            edge_fraction: 0.1,
            max_length_ratio: 3.0,
        }
    }
}
impl SplitConfig {
    #[must_use]
    pub fn match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    #[must_use]
    pub fn midpoint_band(mut self, left: f64, right: f64) -> Self {
        self.left_midpoint_threshold = left;
        self.right_midpoint_threshold = right;
        self
    }

    #[must_use]
    pub fn edge_fraction(mut self, fraction: f64) -> Self {
        self.edge_fraction = fraction;
        self
    }

    #[must_use]
    pub fn max_length_ratio(mut self, ratio: f64) -> Self {
        self.max_length_ratio = ratio;
        self
    }
}

/// Reasons a read is left unsplit
///
/// None of these are errors: the read is simply skipped.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    /// A metadata tag needed to map bases onto samples is absent
    #[error("missing {0} tag")]
    MissingMetadata(&'static str),

    /// The aligner reported no alignment with identical reference and query spans
    #[error("no symmetric self-alignment")]
    NoSelfMatch,

    /// Symmetric self-alignments were found but none passed the thresholds
    #[error("{0}")]
    ThresholdRejected(Threshold),
}

/// The threshold that rejected a read
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// Every candidate was too close to an end or had unbalanced halves
    #[error("no candidate with a central midpoint and balanced halves")]
    Shape,

    /// The self-alignment covers too little of the left half
    #[error("match fraction {0:.3} below threshold")]
    MatchFraction(f64),

    /// The midpoint is outside the accepted band around the centre
    #[error("midpoint fraction {0:.3} outside band")]
    MidpointBand(f64),
}

/// A candidate junction in base space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    /// First base covered by the self-alignment
    start: usize,
    /// Junction between the two halves
    midpoint: usize,
}

/// Decides, for each read, whether and where its raw signal should be split
pub struct SplitDetector<A: SelfAligner> {
    aligner: A,
    config: SplitConfig,
}
impl<A: SelfAligner> SplitDetector<A> {
    #[must_use]
    pub fn new(aligner: A, config: SplitConfig) -> Self {
        Self { aligner, config }
    }

    #[must_use]
    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    #[must_use]
    pub fn aligner(&self) -> &A {
        &self.aligner
    }

    /// Detects a split point, logging the reason at debug level when there is none
    pub fn detect(&self, record: &ReadRecord) -> Option<SplitDecision> {
        match self.assess(record) {
            Ok(decision) => Some(decision),
            Err(rejection) => {
                debug!("Not splitting {}: {}", record.read_id, rejection);
                None
            }
        }
    }

    /// Detects a split point, returning why the read was rejected otherwise
    pub fn assess(&self, record: &ReadRecord) -> Result<SplitDecision, Rejection> {
        let moves = record
            .moves
            .as_deref()
            .ok_or(Rejection::MissingMetadata("mv"))?;
        let trim_offset = record
            .trim_offset
            .ok_or(Rejection::MissingMetadata("ts"))?;
        let num_samples = record
            .num_samples
            .ok_or(Rejection::MissingMetadata("ns"))?;
        let Some((&stride, moves)) = moves.split_first() else {
            return Err(Rejection::MissingMetadata("mv"));
        };

        let candidate = self.find_candidate(&record.sequence)?;
        self.check_thresholds(candidate, record.len())?;

        let boundary = base_to_sample(candidate.midpoint, stride, moves, trim_offset);
        Ok(SplitDecision::at(
            record.read_id.clone(),
            boundary,
            num_samples,
        ))
    }

    /// Returns the first symmetric self-alignment with a usable shape
    ///
    /// Candidates are tried in the order the aligner yields them.
    fn find_candidate(&self, sequence: &[u8]) -> Result<Candidate, Rejection> {
        let len = sequence.len() as f64;
        let mut symmetric = false;

        for aln in self.aligner.self_align(sequence) {
            if !aln.is_symmetric() {
                continue;
            }
            symmetric = true;

            let start = aln.reference.start;
            let midpoint = (aln.reference.start + aln.reference.end) / 2;

            let position = midpoint as f64;
            if position < len * self.config.edge_fraction
                || position > len * (1.0 - self.config.edge_fraction)
            {
                continue;
            }
            if midpoint <= start {
                continue;
            }

            let ratio = (len - position) / (midpoint - start) as f64;
            if ratio >= self.config.max_length_ratio || ratio <= 1.0 / self.config.max_length_ratio
            {
                continue;
            }

            return Ok(Candidate { start, midpoint });
        }

        if symmetric {
            Err(Rejection::ThresholdRejected(Threshold::Shape))
        } else {
            Err(Rejection::NoSelfMatch)
        }
    }

    fn check_thresholds(&self, candidate: Candidate, len: usize) -> Result<(), Rejection> {
        let midpoint = candidate.midpoint as f64;

        let match_frac = (candidate.midpoint - candidate.start) as f64 / midpoint;
        if match_frac < self.config.match_threshold {
            return Err(Rejection::ThresholdRejected(Threshold::MatchFraction(
                match_frac,
            )));
        }

        let len = len as f64;
        if midpoint < self.config.left_midpoint_threshold * len
            || midpoint > self.config.right_midpoint_threshold * len
        {
            return Err(Rejection::ThresholdRejected(Threshold::MidpointBand(
                midpoint / len,
            )));
        }
        Ok(())
    }
}

/// Maps a base index onto the raw sample index where that base begins
///
/// `moves` excludes the leading stride. The signal of bases `[0, base)` ends
/// after the first timestep at which the cumulative number of emitted bases
/// reaches `base`. If the move table never reaches `base` the end of the table is
/// used.
#[must_use]
pub fn base_to_sample(base: usize, stride: u8, moves: &[u8], trim_offset: u64) -> u64 {
    let mut emitted = 0usize;
    let mut timesteps = moves.len();
    for (idx, &m) in moves.iter().enumerate() {
        emitted += usize::from(m);
        if emitted >= base {
            timesteps = idx + 1;
            break;
        }
    }
    timesteps as u64 * u64::from(stride) + trim_offset
}

/// Maps a raw sample index back onto the number of bases emitted before it
///
/// Samples inside the trimmed prefix map to zero.
#[must_use]
pub fn sample_to_base(sample: u64, stride: u8, moves: &[u8], trim_offset: u64) -> usize {
    if stride == 0 || sample <= trim_offset {
        return 0;
    }
    let timesteps = ((sample - trim_offset) / u64::from(stride)) as usize;
    moves
        .iter()
        .take(timesteps)
        .map(|&m| usize::from(m))
        .sum()
}
