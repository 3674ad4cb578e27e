use std::collections::HashMap;

use tracing::{debug, info};

use super::interval::{Interval, IntervalSet};
use super::{AlignmentError, Lcb, LcbList, Region};
use crate::genomics::{
    reverse_complement_in_place, ungap, ungapped_len, Reference, ReferenceList, TrackError,
    TrackList, TrackRemap, GAP, UNKNOWN,
};
use crate::tree::PhylogenyTree;
use crate::variant::{CallerConfig, VariantList};

/// Coordinates of one aligned row on its source contig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// Forward strand, forward coordinates.
    Forward {
        /// 0-based start.
        start: u64,
        /// Ungapped length.
        length: u64,
    },
    /// Reverse strand, forward coordinates (XMFA).
    Reverse {
        /// 0-based start on the forward strand.
        start: u64,
        /// Ungapped length.
        length: u64,
    },
    /// Reverse strand, start counted from the contig end (MAF `-`).
    ReverseRelative {
        /// 0-based start on the reverse strand.
        start: u64,
        /// Ungapped length.
        length: u64,
    },
}

impl Span {
    /// Ungapped length of the span.
    pub fn length(&self) -> u64 {
        match *self {
            Span::Forward { length, .. }
            | Span::Reverse { length, .. }
            | Span::ReverseRelative { length, .. } => length,
        }
    }

    /// Returns `true` for either reverse-strand form.
    pub fn is_reverse(&self) -> bool {
        !matches!(self, Span::Forward { .. })
    }

    /// Start on the forward strand.
    ///
    /// Reverse-relative spans map to `contig_length - start - length`;
    /// `None` when that would be negative.
    pub fn forward_start(&self, contig_length: u64) -> Option<u64> {
        match *self {
            Span::Forward { start, .. } | Span::Reverse { start, .. } => Some(start),
            Span::ReverseRelative { start, length } => contig_length.checked_sub(start + length),
        }
    }
}

/// One row of an alignment block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedSegment {
    /// Track (genome) name.
    pub track: String,
    /// Contig within the track. `None` means `span` is already in the
    /// track's flat coordinate space (and, for the reference row, in the
    /// concatenated reference space).
    pub contig: Option<String>,
    /// Position on the contig.
    pub span: Span,
    /// Length of the source contig, `0` when unknown.
    pub contig_length: u64,
    /// Aligned characters, gaps included.
    pub aligned: Vec<u8>,
}

/// A block handed to the builder by a scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentBlock {
    /// Covers every track; non-core blocks are dropped.
    pub core: bool,
    /// 1-based input line where the block starts, for diagnostics.
    pub line: usize,
    /// Rows in input order.
    pub segments: Vec<AlignedSegment>,
}

/// How input track names map onto the [`TrackList`].
#[derive(Debug)]
pub enum TrackMode<'a> {
    /// Clear the list and create tracks as names appear.
    Fresh,
    /// Keep the list (its order was fixed by a loaded tree). Names must
    /// already exist; the input order is applied to the list and the tree
    /// when the build finishes.
    Remap(&'a mut PhylogenyTree),
}

/// Reconciles a stream of alignment blocks into an [`LcbList`].
///
/// ```ignore
/// let mut builder = LcbBuilder::new(&mut references, &mut tracks, TrackMode::Fresh)
///     .with_variants(&mut variants, CallerConfig::default());
/// for block in maf::CoreBlocks::new(reader)? {
///     builder.add_block(block?)?;
/// }
/// let lcbs = builder.finish()?;
/// ```
#[derive(Debug)]
pub struct LcbBuilder<'a> {
    references: &'a mut ReferenceList,
    tracks: &'a mut TrackList,
    mode: TrackMode<'a>,
    remap: Option<TrackRemap>,
    variants: Option<(&'a mut VariantList, CallerConfig)>,
    lcbs: LcbList,
    intervals: IntervalSet,
    create_references: bool,
    created: Vec<Reference>,
    created_by_name: HashMap<String, usize>,
    sequence_by_contig: HashMap<String, usize>,
    offsets: Vec<HashMap<String, u64>>,
    totals: Vec<u64>,
    rejected: usize,
    skipped: usize,
}

impl<'a> LcbBuilder<'a> {
    /// Start a build. References are created from the alignment when
    /// `references` is empty.
    pub fn new(
        references: &'a mut ReferenceList,
        tracks: &'a mut TrackList,
        mode: TrackMode<'a>,
    ) -> Self {
        let remap = match mode {
            TrackMode::Fresh => {
                tracks.clear();
                None
            }
            TrackMode::Remap(_) => Some(TrackRemap::new(tracks.len())),
        };
        let create_references = references.is_empty();
        Self {
            references,
            tracks,
            mode,
            remap,
            variants: None,
            lcbs: LcbList::new(),
            intervals: IntervalSet::new(),
            create_references,
            created: Vec::new(),
            created_by_name: HashMap::new(),
            sequence_by_contig: HashMap::new(),
            offsets: Vec::new(),
            totals: Vec::new(),
            rejected: 0,
            skipped: 0,
        }
    }

    /// Derive variants from every accepted block into `variants`, which is
    /// reset to the built-in filters first.
    pub fn with_variants(mut self, variants: &'a mut VariantList, config: CallerConfig) -> Self {
        variants.init();
        self.variants = Some((variants, config));
        self
    }

    /// Index a track name will carry once the build finishes.
    pub fn resolve_track(&mut self, file: &str) -> Result<usize, TrackError> {
        match self.remap.as_mut() {
            None => Ok(self.tracks.index_or_add(file)),
            Some(remap) => {
                let old = self.tracks.index_by_file(file)?;
                Ok(remap.assign(old))
            }
        }
    }

    /// Register a track from an input header, with optional metadata.
    pub fn declare_track(
        &mut self,
        file: &str,
        name: Option<&str>,
        size: Option<u64>,
    ) -> Result<usize, TrackError> {
        let index = self.resolve_track(file)?;
        let slot = self.list_slot(index);
        if let Some(name) = name {
            self.tracks.set_name(slot, name);
        }
        if let Some(size) = size {
            self.tracks.set_size(slot, size);
        }
        Ok(index)
    }

    /// Number of blocks accepted so far.
    pub fn accepted(&self) -> usize {
        self.lcbs.len()
    }

    /// Current position in the track list of the track that will end up at
    /// `index`.
    fn list_slot(&self, index: usize) -> usize {
        match &self.remap {
            None => index,
            Some(remap) => (0..self.tracks.len())
                .find(|&old| remap.get(old) == Some(index))
                .unwrap_or(index),
        }
    }

    fn working_track_count(&self) -> usize {
        match &self.remap {
            None => self.tracks.len(),
            Some(remap) => remap.assigned(),
        }
    }

    /// Feed one block. Returns `true` if it became an LCB.
    pub fn add_block(&mut self, block: AlignmentBlock) -> Result<bool, AlignmentError> {
        if !block.core {
            self.skipped += 1;
            return Ok(false);
        }

        let width = block.segments.first().map_or(0, |segment| segment.aligned.len());
        for segment in &block.segments {
            if segment.aligned.len() != width {
                return Err(malformed(block.line, "rows have unequal aligned lengths"));
            }
            let bases = ungapped_len(&segment.aligned);
            if bases != segment.span.length() {
                return Err(malformed(
                    block.line,
                    format!(
                        "row for {} holds {} bases but its coordinates span {}",
                        segment.track,
                        bases,
                        segment.span.length()
                    ),
                ));
            }
        }

        let mut indices = Vec::with_capacity(block.segments.len());
        for segment in &block.segments {
            indices.push(self.resolve_track(&segment.track)?);
        }

        let Some(reference_row) = indices.iter().position(|&index| index == 0) else {
            debug!(line = block.line, "block has no reference row; skipping");
            self.skipped += 1;
            return Ok(false);
        };
        let reference = &block.segments[reference_row];
        let length = reference.span.length();
        if length == 0 {
            self.skipped += 1;
            return Ok(false);
        }
        let forward = reference
            .span
            .forward_start(reference.contig_length)
            .ok_or_else(|| malformed(block.line, "reverse-strand coordinates exceed contig length"))?;
        let (sequence, position) = self.reference_coordinates(reference, forward, length)?;

        if let Err(existing) = self.intervals.try_insert(Interval::new(sequence, position, length)) {
            debug!(
                line = block.line,
                sequence,
                start = position,
                end = position + length,
                existing_start = existing.start,
                existing_end = existing.end,
                "block overlaps an accepted LCB; discarding"
            );
            self.rejected += 1;
            return Ok(false);
        }

        let reverse = reference.span.is_reverse();
        let row_count = self
            .working_track_count()
            .max(indices.iter().map(|&index| index + 1).max().unwrap_or(0));
        let mut regions = vec![Region::default(); row_count];
        let mut rows: Vec<Option<Vec<u8>>> = vec![None; row_count];

        for (segment, &index) in block.segments.into_iter().zip(&indices) {
            if rows[index].is_some() {
                return Err(malformed(
                    block.line,
                    format!("track {} appears twice in one block", segment.track),
                ));
            }
            let start = segment
                .span
                .forward_start(segment.contig_length)
                .ok_or_else(|| malformed(block.line, "reverse-strand coordinates exceed contig length"))?;
            let offset = self.contig_offset(index, segment.contig.as_deref(), segment.contig_length);
            regions[index] = Region {
                position: offset + start,
                length: segment.span.length(),
                reverse: segment.span.is_reverse(),
            };
            let mut aligned = segment.aligned;
            aligned.make_ascii_uppercase();
            rows[index] = Some(aligned);
        }

        let rows: Vec<Vec<u8>> = rows
            .into_iter()
            .map(|row| row.unwrap_or_else(|| vec![GAP; width]))
            .collect();

        if self.create_references {
            let mut bases = ungap(&rows[0]);
            if reverse {
                reverse_complement_in_place(&mut bases);
            }
            let start = position as usize;
            self.created[sequence].sequence[start..start + bases.len()].copy_from_slice(&bases);
        }

        if let Some((variants, config)) = self.variants.as_mut() {
            variants.add_variants_from_alignment(&rows, sequence, position, reverse, config)?;
        }

        self.lcbs.push(Lcb {
            sequence,
            position,
            length,
            concordance: concordance(&rows),
            regions,
        });
        Ok(true)
    }

    /// Sequence id and position of the reference row, creating the
    /// reference buffer when the alignment defines the reference.
    fn reference_coordinates(
        &mut self,
        reference: &AlignedSegment,
        forward: u64,
        length: u64,
    ) -> Result<(usize, u64), AlignmentError> {
        let end = forward + length;

        if self.create_references {
            let name = match &reference.contig {
                Some(contig) => contig.clone(),
                None => self
                    .tracks
                    .get(self.list_slot(0))
                    .map(|track| track.file.clone())
                    .unwrap_or_default(),
            };
            let sequence = match self.created_by_name.get(&name) {
                Some(&sequence) => sequence,
                None => {
                    debug!(reference = %name, length = reference.contig_length, "creating reference from alignment");
                    let sequence = self.created.len();
                    self.created.push(Reference::new(
                        name.clone(),
                        "",
                        vec![UNKNOWN; reference.contig_length as usize],
                    ));
                    self.created_by_name.insert(name, sequence);
                    sequence
                }
            };
            let buffer = &mut self.created[sequence].sequence;
            if (buffer.len() as u64) < end {
                buffer.resize(end as usize, UNKNOWN);
            }
            return Ok((sequence, forward));
        }

        match &reference.contig {
            Some(contig) => {
                let sequence = match self.sequence_by_contig.get(contig) {
                    Some(&sequence) => sequence,
                    None => {
                        let sequence = self.references.index_of(contig)?;
                        self.sequence_by_contig.insert(contig.clone(), sequence);
                        sequence
                    }
                };
                let available = self.references.get(sequence).map_or(0, Reference::len);
                if end > available {
                    return Err(AlignmentError::OutsideReference { position: end });
                }
                Ok((sequence, forward))
            }
            None => {
                let sequence = self
                    .references
                    .sequence_from_concatenated(forward)
                    .ok_or(AlignmentError::OutsideReference { position: forward })?;
                let position = self.references.position_from_concatenated(sequence, forward);
                Ok((sequence, position))
            }
        }
    }

    /// Offset of `(track, contig)` in the track's flat coordinate space,
    /// assigning the running total on first sight.
    fn contig_offset(&mut self, track: usize, contig: Option<&str>, contig_length: u64) -> u64 {
        if self.offsets.len() <= track {
            self.offsets.resize_with(track + 1, HashMap::new);
            self.totals.resize(track + 1, 0);
        }
        let key = contig.unwrap_or_default();
        if let Some(&offset) = self.offsets[track].get(key) {
            return offset;
        }
        let offset = self.totals[track];
        self.offsets[track].insert(key.to_string(), offset);
        self.totals[track] += contig_length;
        offset
    }

    /// Commit created references, track sizes and the track remap, then
    /// sort blocks and variants.
    pub fn finish(self) -> Result<LcbList, AlignmentError> {
        let LcbBuilder {
            references,
            tracks,
            mode,
            remap,
            variants,
            mut lcbs,
            create_references,
            created,
            totals,
            rejected,
            skipped,
            ..
        } = self;

        if lcbs.is_empty() {
            return Err(AlignmentError::NoCore {
                expected_tracks: tracks.len(),
            });
        }

        if create_references {
            for reference in created {
                references.push(reference);
            }
        }

        let table = remap.map(TrackRemap::into_table);
        for (index, &total) in totals.iter().enumerate() {
            if total > 0 {
                let slot = match &table {
                    None => Some(index),
                    Some(table) => table.iter().position(|&new| new == index),
                };
                if let Some(slot) = slot {
                    tracks.set_size(slot, total);
                }
            }
        }

        if let (Some(table), TrackMode::Remap(tree)) = (&table, mode) {
            tracks.reorder(table);
            tree.set_track_indices(table);
        }

        let track_count = tracks.len();
        lcbs.pad_regions(track_count);
        lcbs.sort();

        if let Some((variants, _)) = variants {
            variants.pad_alleles(track_count);
            variants.sort_variants();
        }

        info!(
            lcbs = lcbs.len(),
            rejected,
            skipped,
            tracks = track_count,
            core = lcbs.core_size(),
            "built alignment backbone"
        );
        Ok(lcbs)
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> AlignmentError {
    AlignmentError::MalformedBlock {
        line,
        reason: reason.into(),
    }
}

/// Fraction of columns in which every row carries the same character.
fn concordance(rows: &[Vec<u8>]) -> f32 {
    let Some(first) = rows.first() else {
        return 0.0;
    };
    if first.is_empty() {
        return 0.0;
    }
    let agreeing = (0..first.len())
        .filter(|&column| rows.iter().all(|row| row[column] == first[column]))
        .count();
    agreeing as f32 / first.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(track: &str, contig: &str, start: u64, aligned: &str) -> AlignedSegment {
        AlignedSegment {
            track: track.to_string(),
            contig: Some(contig.to_string()),
            span: Span::Forward {
                start,
                length: ungapped_len(aligned.as_bytes()),
            },
            contig_length: 100,
            aligned: aligned.as_bytes().to_vec(),
        }
    }

    fn block(line: usize, segments: Vec<AlignedSegment>) -> AlignmentBlock {
        AlignmentBlock {
            core: true,
            line,
            segments,
        }
    }

    #[test]
    fn reverse_relative_span_normalises_to_forward_strand() {
        let span = Span::ReverseRelative { start: 10, length: 5 };
        assert_eq!(span.forward_start(100), Some(85));
        assert_eq!(span.forward_start(12), None);
        assert_eq!(Span::Reverse { start: 7, length: 3 }.forward_start(100), Some(7));
    }

    #[test]
    fn overlapping_block_is_rejected_without_touching_accepted_ones() {
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        let mut builder = LcbBuilder::new(&mut references, &mut tracks, TrackMode::Fresh);

        assert!(builder
            .add_block(block(1, vec![segment("ref", "chr", 10, "ACGT"), segment("a", "c1", 0, "ACGT")]))
            .unwrap());
        assert!(!builder
            .add_block(block(5, vec![segment("ref", "chr", 12, "GGGG"), segment("a", "c1", 20, "GGGG")]))
            .unwrap());
        assert!(builder
            .add_block(block(9, vec![segment("ref", "chr", 0, "TT"), segment("a", "c1", 30, "TT")]))
            .unwrap());

        let lcbs = builder.finish().unwrap();
        let spans: Vec<_> = lcbs.iter().map(|lcb| (lcb.position, lcb.length)).collect();
        assert_eq!(spans, vec![(0, 2), (10, 4)]);
        let reference = &references.get(0).unwrap().sequence;
        assert_eq!(reference.len(), 100);
        assert_eq!(&reference[..2], b"TT");
        assert_eq!(&reference[10..16], b"ACGTNN");
        assert_eq!(tracks.get(1).unwrap().size, 100);
    }

    #[test]
    fn contigs_get_running_offsets_per_track() {
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        let mut builder = LcbBuilder::new(&mut references, &mut tracks, TrackMode::Fresh);
        builder
            .add_block(block(1, vec![segment("ref", "chr", 0, "AC"), segment("a", "x", 5, "AC")]))
            .unwrap();
        builder
            .add_block(block(2, vec![segment("ref", "chr", 50, "GT"), segment("a", "y", 5, "GT")]))
            .unwrap();
        let lcbs = builder.finish().unwrap();
        assert_eq!(lcbs.get(0).unwrap().regions[1].position, 5);
        assert_eq!(lcbs.get(1).unwrap().regions[1].position, 105);
        assert_eq!(tracks.get(1).unwrap().size, 200);
    }

    #[test]
    fn no_core_blocks_is_an_error() {
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        let mut builder = LcbBuilder::new(&mut references, &mut tracks, TrackMode::Fresh);
        let mut partial = block(1, vec![segment("ref", "chr", 0, "AC")]);
        partial.core = false;
        assert!(!builder.add_block(partial).unwrap());
        assert!(matches!(
            builder.finish(),
            Err(AlignmentError::NoCore { expected_tracks: 0 })
        ));
    }

    #[test]
    fn unresolved_contig_against_loaded_reference_fails() {
        let mut references = ReferenceList::new();
        references.add_reference("chr", "", vec![b'A'; 20]);
        let mut tracks = TrackList::new();
        let mut builder = LcbBuilder::new(&mut references, &mut tracks, TrackMode::Fresh);
        let result = builder.add_block(block(3, vec![segment("ref", "plasmid", 0, "AC")]));
        assert!(matches!(result, Err(AlignmentError::Reference(_))));
    }

    #[test]
    fn coordinate_mismatch_is_malformed() {
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        let mut builder = LcbBuilder::new(&mut references, &mut tracks, TrackMode::Fresh);
        let mut bad = segment("ref", "chr", 0, "AC-T");
        bad.span = Span::Forward { start: 0, length: 4 };
        assert!(matches!(
            builder.add_block(block(7, vec![bad])),
            Err(AlignmentError::MalformedBlock { line: 7, .. })
        ));
    }

    #[test]
    fn reverse_reference_row_fills_forward_reference() {
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        let mut builder = LcbBuilder::new(&mut references, &mut tracks, TrackMode::Fresh);
        let mut reference = segment("ref", "chr", 0, "AACG");
        reference.span = Span::ReverseRelative { start: 0, length: 4 };
        reference.contig_length = 10;
        builder.add_block(block(1, vec![reference])).unwrap();
        let lcbs = builder.finish().unwrap();
        assert_eq!(lcbs.get(0).unwrap().position, 6);
        assert!(lcbs.get(0).unwrap().is_reverse());
        assert_eq!(references.get(0).unwrap().sequence, b"NNNNNNCGTT".to_vec());
    }

    #[test]
    fn concordance_counts_agreeing_columns() {
        let rows = vec![b"ACGT".to_vec(), b"ACGA".to_vec()];
        assert!((concordance(&rows) - 0.75).abs() < f32::EPSILON);
    }
}
