use std::collections::BTreeSet;

/// Half-open reference interval `[start, end)` on one sequence.
///
/// Ordered by `(sequence, start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    /// Reference sequence id.
    pub sequence: usize,
    /// First covered position.
    pub start: u64,
    /// One past the last covered position.
    pub end: u64,
}

impl Interval {
    /// Interval covering `length` positions from `start`.
    pub fn new(sequence: usize, start: u64, length: u64) -> Self {
        Self {
            sequence,
            start,
            end: start + length,
        }
    }

    /// Returns `true` when both intervals share at least one position.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.sequence == other.sequence && self.start < other.end && other.start < self.end
    }
}

/// Set of pairwise non-overlapping reference intervals.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    intervals: BTreeSet<Interval>,
}

impl IntervalSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accepted intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Returns `true` when nothing has been accepted.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Accepted interval overlapping `candidate`, if any.
    ///
    /// Since accepted intervals never overlap each other, only the first
    /// interval starting at or after `candidate.start` and the last one
    /// starting before it can collide.
    pub fn find_overlap(&self, candidate: &Interval) -> Option<Interval> {
        let key = Interval {
            sequence: candidate.sequence,
            start: candidate.start,
            end: 0,
        };
        let right = self.intervals.range(key..).next();
        let left = self.intervals.range(..key).next_back();
        right
            .into_iter()
            .chain(left)
            .find(|existing| existing.overlaps(candidate))
            .copied()
    }

    /// Insert `candidate` unless it overlaps an accepted interval.
    ///
    /// Returns the colliding interval on rejection.
    pub fn try_insert(&mut self, candidate: Interval) -> Result<(), Interval> {
        if let Some(existing) = self.find_overlap(&candidate) {
            return Err(existing);
        }
        self.intervals.insert(candidate);
        Ok(())
    }

    /// Iterate accepted intervals in order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }
}
