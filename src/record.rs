//! Record types shared by the detection and splitting stages
//!
//! A [`ReadRecord`] is a basecalled read as pulled from the record stream.
//! Detection turns it into an optional [`SplitDecision`] expressed in raw
//! sample coordinates, which the splitter later applies to the raw signal.

use std::fmt;
use std::ops::Range;

/// Mapping from read identifier to its accepted split decision
///
/// Reads that are absent from the map are not split.
pub type DecisionMap = hashbrown::HashMap<String, SplitDecision>;

/// A basecalled read with the metadata needed to locate a split in signal space
///
/// Metadata fields are optional so that a missing tag can be told apart from a
/// tag that is present but zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadRecord {
    /// Unique read identifier
    pub read_id: String,

    /// Called bases
    pub sequence: Vec<u8>,

    /// Move table: the first element is the stride, the remaining elements are
    /// the number of bases emitted at each timestep
    pub moves: Option<Vec<u8>>,

    /// Number of raw samples trimmed before the first emitted base
    pub trim_offset: Option<u64>,

    /// Total number of raw samples in the read
    pub num_samples: Option<u64>,
}
impl ReadRecord {
    /// Creates a record without any metadata tags
    #[must_use]
    pub fn new(read_id: impl Into<String>, sequence: impl Into<Vec<u8>>) -> Self {
        Self {
            read_id: read_id.into(),
            sequence: sequence.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_moves(mut self, moves: Vec<u8>) -> Self {
        self.moves = Some(moves);
        self
    }

    #[must_use]
    pub fn with_trim_offset(mut self, trim_offset: u64) -> Self {
        self.trim_offset = Some(trim_offset);
        self
    }

    #[must_use]
    pub fn with_num_samples(mut self, num_samples: u64) -> Self {
        self.num_samples = Some(num_samples);
        self
    }

    /// Length of the called sequence in bases
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// A non-trivial alignment of a sequence against itself
///
/// Both ranges are half-open intervals over base indices of the aligned sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfMatch {
    pub reference: Range<usize>,
    pub query: Range<usize>,
}
impl SelfMatch {
    #[must_use]
    pub fn new(reference: Range<usize>, query: Range<usize>) -> Self {
        Self { reference, query }
    }

    /// Whether the reference and query cover exactly the same span
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.reference == self.query
    }
}

/// Which half of a split read a derived record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}
impl Side {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}
impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted split of a read in raw sample space
///
/// The two ranges always partition `[0, num_samples)`: `left` starts at zero,
/// `right` ends at the sample count and `right.start == left.end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDecision {
    pub read_id: String,
    pub left: Range<u64>,
    pub right: Range<u64>,
}
impl SplitDecision {
    /// Creates a decision splitting `[0, num_samples)` at `boundary`
    ///
    /// The boundary is clamped to the sample count so the ranges always partition
    /// the full signal.
    #[must_use]
    pub fn at(read_id: impl Into<String>, boundary: u64, num_samples: u64) -> Self {
        let boundary = boundary.min(num_samples);
        Self {
            read_id: read_id.into(),
            left: 0..boundary,
            right: boundary..num_samples,
        }
    }

    /// The sample index where the right half begins
    #[must_use]
    pub fn boundary(&self) -> u64 {
        self.left.end
    }

    /// Total number of samples covered by the decision
    #[must_use]
    pub fn num_samples(&self) -> u64 {
        self.right.end
    }
}
