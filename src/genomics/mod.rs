//! Reference sequences, tracks and annotations shared by the alignment,
//! variant and tree engines.
//!
//! Everything here is a leaf dependency: none of these types know about
//! LCBs, variants or trees.

mod annotation;
mod codon;
mod reference;
mod sequence;
mod track;

pub use annotation::{Annotation, AnnotationError, AnnotationList, AnnotationRegion};
pub use codon::{translate, translate_reverse};
pub use reference::{Reference, ReferenceError, ReferenceList};
pub use sequence::{
    basename, basename_stem, complement, reverse_complement, reverse_complement_in_place, ungap,
    ungapped_len, GAP, UNKNOWN,
};
pub use track::{Track, TrackError, TrackList, TrackRemap};
