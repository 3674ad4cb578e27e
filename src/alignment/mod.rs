//! Alignment backbone: locally collinear blocks (LCBs) anchored on the
//! reference.
//!
//! Scanners ([`maf`], [`xmfa`], [`mfa`]) turn text into a stream of
//! [`AlignmentBlock`]s; the [`LcbBuilder`] reconciles that stream into a
//! non-overlapping, reference-sorted [`LcbList`] and optionally derives
//! variants from every accepted block.

mod builder;
mod interval;
pub mod maf;
pub mod mfa;
mod writer;
pub mod xmfa;

use std::io;

use thiserror::Error;

use crate::genomics::{ReferenceError, ReferenceList, TrackError};
use crate::variant::VariantError;

pub use builder::{AlignedSegment, AlignmentBlock, LcbBuilder, Span, TrackMode};
pub use interval::{Interval, IntervalSet};
pub use writer::{reconstruct_rows, FASTA_WIDTH, XMFA_WIDTH};

/// Errors raised while building or emitting the alignment backbone.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// Underlying read or write failure.
    #[error("alignment I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A sequence name could not be resolved against the loaded reference.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// A track name could not be resolved against the loaded tracks.
    #[error(transparent)]
    Track(#[from] TrackError),

    /// Variant derivation failed for an accepted block.
    #[error(transparent)]
    Variant(#[from] VariantError),

    /// No block covered every track.
    #[error("no core alignment blocks found (expected {expected_tracks} tracks per block)")]
    NoCore {
        /// Track count a core block must cover.
        expected_tracks: usize,
    },

    /// A block violates the format's structural rules.
    #[error("malformed alignment block at line {line}: {reason}")]
    MalformedBlock {
        /// 1-based input line of the block (0 when unknown).
        line: usize,
        /// What is wrong.
        reason: String,
    },

    /// A concatenated coordinate lies beyond every loaded reference.
    #[error("alignment position {position} lies outside the loaded reference")]
    OutsideReference {
        /// Offending concatenated coordinate.
        position: u64,
    },
}

/// One track's aligned interval inside an LCB.
///
/// Tracks not covered by a block carry a zero-length placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Region {
    /// Start in the track's flat (contig-concatenated) coordinate space.
    pub position: u64,
    /// Ungapped length.
    pub length: u64,
    /// Aligned on the reverse strand.
    pub reverse: bool,
}

/// A locally collinear block.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Lcb {
    /// Reference sequence id.
    pub sequence: usize,
    /// Start on the reference sequence.
    pub position: u64,
    /// Ungapped reference span; the block covers `[position, position + length)`.
    pub length: u64,
    /// Fraction of aligned columns in which every track agrees.
    pub concordance: f32,
    /// One region per track, in track order.
    pub regions: Vec<Region>,
}

impl Lcb {
    /// Reference-anchored interval of this block.
    pub fn interval(&self) -> Interval {
        Interval::new(self.sequence, self.position, self.length)
    }

    /// The reference row was aligned on the reverse strand.
    pub fn is_reverse(&self) -> bool {
        self.regions.first().map_or(false, |region| region.reverse)
    }
}

/// Ordered, non-overlapping LCBs.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LcbList {
    lcbs: Vec<Lcb>,
}

impl LcbList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// One block spanning every reference end to end, as for a plain
    /// multi-FASTA alignment. `track_lengths` gives each track's region.
    pub fn single(references: &ReferenceList, track_lengths: &[u64]) -> Self {
        let regions = track_lengths
            .iter()
            .map(|&length| Region {
                position: 0,
                length,
                reverse: false,
            })
            .collect();
        Self {
            lcbs: vec![Lcb {
                sequence: 0,
                position: 0,
                length: references.total_len(),
                concordance: 0.0,
                regions,
            }],
        }
    }

    /// Remove all blocks.
    pub fn clear(&mut self) {
        self.lcbs.clear();
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.lcbs.len()
    }

    /// Returns `true` when no block is loaded.
    pub fn is_empty(&self) -> bool {
        self.lcbs.is_empty()
    }

    /// Block at `index`.
    pub fn get(&self, index: usize) -> Option<&Lcb> {
        self.lcbs.get(index)
    }

    /// All blocks in order.
    pub fn as_slice(&self) -> &[Lcb] {
        &self.lcbs
    }

    /// Iterate blocks in order.
    pub fn iter(&self) -> impl Iterator<Item = &Lcb> {
        self.lcbs.iter()
    }

    /// Append a block without any overlap check.
    pub fn push(&mut self, lcb: Lcb) {
        self.lcbs.push(lcb);
    }

    /// Stable sort by `(sequence, position)`.
    pub fn sort(&mut self) {
        self.lcbs.sort_by_key(|lcb| (lcb.sequence, lcb.position));
    }

    /// Total reference bases covered by blocks.
    pub fn core_size(&self) -> u64 {
        self.lcbs.iter().map(|lcb| lcb.length).sum()
    }

    /// Pad every block's regions to `track_count` entries.
    pub(crate) fn pad_regions(&mut self, track_count: usize) {
        for lcb in &mut self.lcbs {
            if lcb.regions.len() < track_count {
                lcb.regions.resize(track_count, Region::default());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcb(sequence: usize, position: u64, length: u64) -> Lcb {
        Lcb {
            sequence,
            position,
            length,
            ..Lcb::default()
        }
    }

    #[test]
    fn sort_orders_by_sequence_then_position() {
        let mut list = LcbList::new();
        list.push(lcb(1, 0, 5));
        list.push(lcb(0, 50, 10));
        list.push(lcb(0, 10, 20));
        list.sort();
        let keys: Vec<_> = list.iter().map(|lcb| (lcb.sequence, lcb.position)).collect();
        assert_eq!(keys, vec![(0, 10), (0, 50), (1, 0)]);
        assert_eq!(list.core_size(), 35);
    }

    #[test]
    fn single_block_covers_concatenated_reference() {
        let mut references = ReferenceList::new();
        references.add_reference("a", "", b"ACGT".to_vec());
        references.add_reference("b", "", b"GG".to_vec());
        let list = LcbList::single(&references, &[6, 5]);
        assert_eq!(list.len(), 1);
        let block = list.get(0).unwrap();
        assert_eq!(block.length, 6);
        assert_eq!(block.regions.len(), 2);
        assert_eq!(block.regions[1].length, 5);
        assert!(!block.is_reverse());
    }
}
