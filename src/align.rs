//! Self-alignment of called sequences
//!
//! Detection only needs to know where a read aligns to itself at a non-trivial
//! offset. The [`SelfAligner`] trait is the seam for plugging in an alignment
//! engine; [`RevCompAligner`] is a small built-in engine which finds the
//! reverse-complement (hairpin) structure that fused template/complement reads
//! carry.

use auto_impl::auto_impl;
use hashbrown::HashMap;

use crate::SelfMatch;

/// Default k-mer size of the built-in aligner
pub const DEFAULT_KMER_SIZE: usize = 15;

/// Default number of anchors a chain needs before it is reported
pub const DEFAULT_MIN_ANCHORS: usize = 3;

/// k-mers occurring more often than this are ignored as repetitive
pub const DEFAULT_MAX_OCCURRENCES: usize = 64;

/// An engine aligning a sequence against itself
///
/// Implementations must never report the trivial identity alignment of the
/// sequence onto itself. Candidates are consumed in the order they are yielded.
#[auto_impl(&, Box, Arc)]
pub trait SelfAligner: Send + Sync {
    fn self_align<'a>(&'a self, sequence: &'a [u8]) -> Box<dyn Iterator<Item = SelfMatch> + 'a>;
}

/// Reverse-complement self aligner based on exact k-mer anchors
///
/// Every k-mer whose reverse complement also occurs in the sequence forms an
/// anchor `(i, j)`. A hairpin centred on position `c` places all of its anchors on
/// the anti-diagonal `i + j = 2c - k`, so anchors are grouped by `i + j` and split
/// into chains wherever consecutive anchors are more than `max_gap` bases apart.
/// Chains are yielded longest first.
#[derive(Debug, Clone, Copy)]
pub struct RevCompAligner {
    k: usize,
    min_anchors: usize,
    max_gap: usize,
    max_occurrences: usize,
}
impl Default for RevCompAligner {
    fn default() -> Self {
        Self::new(DEFAULT_KMER_SIZE, DEFAULT_MIN_ANCHORS)
    }
}
impl RevCompAligner {
    /// Creates an aligner with the given k-mer size and minimum chain size
    ///
    /// The maximum gap between chained anchors defaults to the k-mer size.
    #[must_use]
    pub fn new(k: usize, min_anchors: usize) -> Self {
        Self {
            k: k.max(1),
            min_anchors: min_anchors.max(1),
            max_gap: k.max(1),
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
        }
    }

    #[must_use]
    pub fn max_gap(mut self, max_gap: usize) -> Self {
        self.max_gap = max_gap.max(1);
        self
    }

    #[must_use]
    pub fn max_occurrences(mut self, max_occurrences: usize) -> Self {
        self.max_occurrences = max_occurrences.max(1);
        self
    }

    /// Collect all reverse-complement anchors grouped by anti-diagonal
    fn anchors(&self, sequence: &[u8]) -> HashMap<usize, Vec<usize>> {
        let mut diagonals: HashMap<usize, Vec<usize>> = HashMap::new();
        if sequence.len() < self.k {
            return diagonals;
        }

        let upper: Vec<u8> = sequence.iter().map(u8::to_ascii_uppercase).collect();

        let mut positions: HashMap<&[u8], Vec<usize>> = HashMap::new();
        for (i, kmer) in upper.windows(self.k).enumerate() {
            if kmer.iter().all(|n| matches!(n, b'A' | b'C' | b'G' | b'T')) {
                positions.entry(kmer).or_default().push(i);
            }
        }

        let mut rc = Vec::with_capacity(self.k);
        for (i, kmer) in upper.windows(self.k).enumerate() {
            if !reverse_complement(kmer, &mut rc) {
                continue;
            }
            let Some(hits) = positions.get(rc.as_slice()) else {
                continue;
            };
            if hits.len() > self.max_occurrences {
                continue;
            }
            for &j in hits {
                diagonals.entry(i + j).or_default().push(i);
            }
        }
        diagonals
    }

    /// Split the anchors of one anti-diagonal into chains
    fn chains(&self, diagonal: usize, mut starts: Vec<usize>, out: &mut Vec<SelfMatch>) {
        starts.sort_unstable();
        starts.dedup();

        let mut chain_start = 0;
        for idx in 1..=starts.len() {
            let broken = idx == starts.len() || starts[idx] - starts[idx - 1] > self.max_gap;
            if !broken {
                continue;
            }
            let chain = &starts[chain_start..idx];
            chain_start = idx;
            if chain.len() < self.min_anchors {
                continue;
            }

            // query span covered by the chain, and its mirror on the reference
            let q_start = chain[0];
            let q_end = chain[chain.len() - 1] + self.k;
            let r_start = diagonal - chain[chain.len() - 1];
            let r_end = diagonal - chain[0] + self.k;
            out.push(SelfMatch::new(r_start..r_end, q_start..q_end));
        }
    }
}

impl SelfAligner for RevCompAligner {
    fn self_align<'a>(&'a self, sequence: &'a [u8]) -> Box<dyn Iterator<Item = SelfMatch> + 'a> {
        let mut matches = Vec::new();
        for (diagonal, starts) in self.anchors(sequence) {
            self.chains(diagonal, starts, &mut matches);
        }
        matches.sort_by(|a, b| {
            b.query
                .len()
                .cmp(&a.query.len())
                .then(a.query.start.cmp(&b.query.start))
                .then(a.reference.start.cmp(&b.reference.start))
        });
        Box::new(matches.into_iter())
    }
}

/// Writes the reverse complement of `kmer` into `buf`
///
/// Returns false if the k-mer contains anything but `ACGT`.
fn reverse_complement(kmer: &[u8], buf: &mut Vec<u8>) -> bool {
    buf.clear();
    for &n in kmer.iter().rev() {
        buf.push(match n {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            _ => return false,
        });
    }
    true
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        let mut buf = Vec::new();
        assert!(reverse_complement(b"AACGT", &mut buf));
        assert_eq!(buf, b"ACGTT");
        assert!(!reverse_complement(b"AANGT", &mut buf));
    }

    #[test]
    fn test_hairpin_is_symmetric_and_first() {
        let sequence = b"TTTTTTTTTTTTGGAGATCTCCAAAAAAA";
        let aligner = RevCompAligner::new(5, 3);
        let first = aligner.self_align(sequence).next().unwrap();
        assert!(first.is_symmetric());
        assert_eq!(first.reference, 5..29);
        assert_eq!(first.query, 5..29);
    }

    #[test]
    fn test_no_identity_match() {
        // no k-mer has its reverse complement anywhere in the sequence
        let sequence = b"AAAAACCCCCAAAAACCCCC";
        let aligner = RevCompAligner::new(5, 1);
        assert_eq!(aligner.self_align(sequence).count(), 0);
    }

    #[test]
    fn test_short_sequence() {
        let aligner = RevCompAligner::default();
        assert_eq!(aligner.self_align(b"ACGT").count(), 0);
    }

    #[test]
    fn test_trait_object_by_reference() {
        let aligner = RevCompAligner::new(5, 3);
        let borrowed: &dyn SelfAligner = &aligner;
        let boxed: Box<dyn SelfAligner> = Box::new(aligner);
        let sequence = b"TTTTTTTTTTTTGGAGATCTCCAAAAAAA";
        assert_eq!(
            borrowed.self_align(sequence).next(),
            boxed.self_align(sequence).next()
        );
    }
}
