//! Variant derivation, filter registry and variant-shaped I/O.
//!
//! Variants are derived column by column from LCB alignments
//! ([`VariantList::add_variants_from_alignment`]) or read from VCF, carry a
//! bitmask of [`Filter`] flags, and are emitted as VCF or SNP multi-FASTA.

pub mod bed;
mod caller;
mod snp;
pub mod vcf;

use std::io;

use thiserror::Error;
use tracing::debug;

use crate::genomics::{ReferenceError, TrackError, GAP};

pub use bed::BedInterval;
pub use caller::{CallerConfig, WindowThreshold};
pub use vcf::{TrackSet, VcfOptions, VcfSelection};

/// Set when the reference or any allele is a gap.
pub const FILTER_INDEL: u64 = 1;
/// Set when the reference or any allele is `N`.
pub const FILTER_N: u64 = 2;
/// Set near LCB boundaries.
pub const FILTER_LCB: u64 = 4;
/// Set in low-identity alignment windows.
pub const FILTER_CONSERVATION: u64 = 8;
/// Set in gap-dense alignment windows.
pub const FILTER_ALIGNMENT: u64 = 16;

/// Filter flags are bits of a `u64`.
pub const MAX_FILTERS: usize = 64;

const BUILTIN_FILTERS: [(&str, &str); 5] = [
    ("IND", "Indel"),
    ("N", "Ambiguous or unknown base"),
    ("LCB", "Near LCB boundary"),
    ("CID", "Low local conservation"),
    ("ALN", "High local gap density"),
];

/// Errors raised while deriving, reading or filtering variants.
#[derive(Debug, Error)]
pub enum VariantError {
    /// Underlying read or write failure.
    #[error("variant I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A record cannot be expressed as single-column substitutions and
    /// anchored indels.
    #[error("compound variant in VCF record {record} cannot be represented")]
    CompoundVariant {
        /// 1-based data record.
        record: usize,
    },

    /// Two records assign different alternate alleles to one sample at one
    /// position.
    #[error("conflicting variants in VCF record {record} for {track}: '{previous}' vs '{new}'")]
    ConflictingVariant {
        /// 1-based data record of the second assignment.
        record: usize,
        /// Sample (track file) name.
        track: String,
        /// Allele recorded first.
        previous: char,
        /// Allele of the offending record.
        new: char,
    },

    /// Aligned rows of one block differ in length.
    #[error("aligned rows differ in length (expected {expected}, found {found})")]
    RaggedAlignment {
        /// Length of the reference row.
        expected: usize,
        /// Length of the offending row.
        found: usize,
    },

    /// All filter bits are in use.
    #[error("cannot register filter \"{0}\": all {max} filter bits are in use", max = MAX_FILTERS)]
    TooManyFilters(String),

    /// A record could not be parsed.
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord {
        /// 1-based input line.
        line: usize,
        /// What is wrong.
        reason: String,
    },

    /// A VCF data record could not be interpreted.
    #[error("invalid VCF record {record}: {reason}")]
    InvalidRecord {
        /// 1-based data record.
        record: usize,
        /// What is wrong.
        reason: String,
    },

    /// Caller configuration rejected.
    #[error("invalid caller configuration: {0}")]
    InvalidConfig(String),

    /// A sequence name could not be resolved.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// A sample name could not be resolved.
    #[error(transparent)]
    Track(#[from] TrackError),
}

/// A registered filter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Filter {
    /// Single-bit flag.
    pub flag: u64,
    /// Short VCF identifier.
    pub name: String,
    /// Free-text description.
    pub description: String,
}

/// One variant column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variant {
    /// Reference sequence id.
    pub sequence: usize,
    /// Reference position of the anchoring base.
    pub position: u64,
    /// `0` for the anchoring base itself, negative for reference gaps
    /// preceding it at a block start, positive for reference gaps after it.
    pub offset: i32,
    /// Reference character (`-` for reference gaps).
    pub reference: u8,
    /// One character per track, in track order.
    pub alleles: Vec<u8>,
    /// OR of applicable filter flags.
    pub filters: u64,
    /// Pass-through quality.
    pub quality: u32,
}

impl Variant {
    /// Total-order key.
    #[inline]
    pub fn key(&self) -> (usize, u64, i32) {
        (self.sequence, self.position, self.offset)
    }

    /// The reference or any allele is a gap.
    pub fn is_indel(&self) -> bool {
        self.reference == GAP || self.alleles.contains(&GAP)
    }

    /// No filter bits outside `allowed` are set.
    pub fn passes(&self, allowed: u64) -> bool {
        self.filters & !allowed == 0
    }
}

/// Variants and the filter registry they refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariantList {
    variants: Vec<Variant>,
    filters: Vec<Filter>,
}

impl VariantList {
    /// Empty list with no filters registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty list with the built-in filters registered.
    pub fn with_builtin_filters() -> Self {
        let mut list = Self::new();
        list.init();
        list
    }

    /// Drop all variants and filters, then register the built-in filters
    /// (`IND`, `N`, `LCB`, `CID`, `ALN`) with flags 1, 2, 4, 8, 16.
    pub fn init(&mut self) {
        self.clear();
        for (index, (name, description)) in BUILTIN_FILTERS.iter().enumerate() {
            self.filters.push(Filter {
                flag: 1 << index,
                name: (*name).to_string(),
                description: (*description).to_string(),
            });
        }
    }

    /// Drop all variants and filters.
    pub fn clear(&mut self) {
        self.variants.clear();
        self.filters.clear();
    }

    /// Register a filter under the next free bit and return its flag.
    pub fn add_filter(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<u64, VariantError> {
        let name = name.into();
        if self.filters.len() >= MAX_FILTERS {
            return Err(VariantError::TooManyFilters(name));
        }
        let flag = 1u64 << self.filters.len();
        debug!(filter = %name, flag, "registered filter");
        self.filters.push(Filter {
            flag,
            name,
            description: description.into(),
        });
        Ok(flag)
    }

    /// Registered filters in flag order.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Filter registered as `name`.
    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.iter().find(|filter| filter.name == name)
    }

    /// Names of the filters set in `mask`, in flag order.
    pub fn filter_names(&self, mask: u64) -> Vec<&str> {
        self.filters
            .iter()
            .filter(|filter| mask & filter.flag != 0)
            .map(|filter| filter.name.as_str())
            .collect()
    }

    /// Append a variant.
    pub fn push(&mut self, variant: Variant) {
        self.variants.push(variant);
    }

    /// Number of variants.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Returns `true` when no variant is stored.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Variant at `index`.
    pub fn get(&self, index: usize) -> Option<&Variant> {
        self.variants.get(index)
    }

    /// All variants in current order.
    pub fn as_slice(&self) -> &[Variant] {
        &self.variants
    }

    /// Iterate variants in current order.
    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter()
    }

    /// Stable sort by `(sequence, position, offset)`.
    pub fn sort_variants(&mut self) {
        self.variants.sort_by_key(Variant::key);
    }

    /// Returns `true` when variants are in `(sequence, position, offset)` order.
    pub fn is_sorted(&self) -> bool {
        self.variants
            .windows(2)
            .all(|pair| pair[0].key() <= pair[1].key())
    }

    /// Sorted variants anchored in `[start, end)` on `sequence`.
    pub fn range(&self, sequence: usize, start: u64, end: u64) -> &[Variant] {
        let low = self
            .variants
            .partition_point(|variant| (variant.sequence, variant.position) < (sequence, start));
        let high = self
            .variants
            .partition_point(|variant| (variant.sequence, variant.position) < (sequence, end));
        &self.variants[low..high.max(low)]
    }

    /// Extend every allele vector to `track_count` entries with gaps.
    pub(crate) fn pad_alleles(&mut self, track_count: usize) {
        for variant in &mut self.variants {
            if variant.alleles.len() < track_count {
                variant.alleles.resize(track_count, GAP);
            }
        }
    }

    /// Register a filter for `intervals` and set its bit on every variant
    /// anchored inside one of them. Returns the new flag.
    pub fn add_filter_from_bed(
        &mut self,
        intervals: &[BedInterval],
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<u64, VariantError> {
        let flag = self.add_filter(name, description)?;
        let merged = bed::merge(intervals);
        let mut hits = 0usize;
        for variant in &mut self.variants {
            if bed::contains(&merged, variant.sequence, variant.position) {
                variant.filters |= flag;
                hits += 1;
            }
        }
        debug!(flag, intervals = merged.len(), hits, "applied BED filter");
        Ok(flag)
    }
}
