//! Backbone emitters: XMFA, aligned multi-FASTA and backbone tables.
//!
//! Aligned rows are not stored; they are rebuilt from the reference and the
//! variant columns anchored inside each block.

use std::io::{self, Write};

use tracing::debug;

use super::{Lcb, LcbList};
use crate::genomics::{reverse_complement_in_place, ReferenceList, TrackList, GAP, UNKNOWN};
use crate::variant::{Variant, VariantList};

/// Bases per line in XMFA output.
pub const XMFA_WIDTH: usize = 80;
/// Bases per line in multi-FASTA output.
pub const FASTA_WIDTH: usize = 70;

/// One rebuilt alignment column.
#[derive(Debug, Clone, Copy)]
enum Column<'a> {
    /// A reference base no variant touches.
    Invariant { sequence: usize, position: u64, base: u8 },
    /// A variant column.
    Variant(&'a Variant),
}

impl Column<'_> {
    /// `(sequence, position, offset)` of the column.
    fn key(&self) -> (usize, u64, i32) {
        match *self {
            Column::Invariant { sequence, position, .. } => (sequence, position, 0),
            Column::Variant(variant) => (variant.sequence, variant.position, variant.offset),
        }
    }

    fn push_onto(&self, rows: &mut [Vec<u8>]) {
        match *self {
            Column::Invariant { base, .. } => rows.iter_mut().for_each(|row| row.push(base)),
            Column::Variant(variant) => {
                for (track, row) in rows.iter_mut().enumerate() {
                    row.push(variant.alleles.get(track).copied().unwrap_or(GAP));
                }
            }
        }
    }
}

/// Walk the columns of `lcb` in forward reference orientation.
///
/// Each reference base contributes one column (its offset-0 variant, or
/// the base itself), preceded by the block-start insertion columns and
/// followed by its insertion columns. A block that runs past the end of
/// one reference continues on the next.
fn for_each_column<'v>(
    lcb: &Lcb,
    references: &ReferenceList,
    variants: &'v VariantList,
    mut visit: impl FnMut(Column<'v>),
) {
    let start = references.concatenated_position(lcb.sequence, lcb.position);
    let end = start + lcb.length;

    let mut concatenated = start;
    while concatenated < end {
        let Some(sequence) = references.sequence_from_concatenated(concatenated) else {
            break;
        };
        let position = references.position_from_concatenated(sequence, concatenated);
        let bases = references.get(sequence).map_or(&[][..], |reference| reference.sequence.as_slice());
        let piece = (end - concatenated).min(bases.len() as u64 - position);
        let anchored = variants.range(sequence, position, position + piece);

        let mut next = 0;
        for anchor in position..position + piece {
            let first = next;
            while next < anchored.len() && anchored[next].position == anchor {
                next += 1;
            }
            let group = &anchored[first..next];
            let base = bases.get(anchor as usize).copied().unwrap_or(UNKNOWN);

            for variant in group.iter().filter(|variant| variant.offset < 0) {
                visit(Column::Variant(variant));
            }
            match group.iter().rfind(|variant| variant.offset == 0) {
                Some(variant) => visit(Column::Variant(variant)),
                None => visit(Column::Invariant {
                    sequence,
                    position: anchor,
                    base,
                }),
            }
            for variant in group.iter().filter(|variant| variant.offset > 0) {
                visit(Column::Variant(variant));
            }
        }
        concatenated += piece.max(1);
    }
}

/// Rebuild the aligned rows of `lcb` in forward reference orientation.
pub fn reconstruct_rows(
    lcb: &Lcb,
    references: &ReferenceList,
    variants: &VariantList,
    track_count: usize,
) -> Vec<Vec<u8>> {
    let mut rows = vec![Vec::with_capacity(lcb.length as usize); track_count];
    for_each_column(lcb, references, variants, |column| column.push_onto(&mut rows));
    rows
}

fn write_wrapped<W: Write>(out: &mut W, bases: &[u8], width: usize) -> io::Result<()> {
    for chunk in bases.chunks(width.max(1)) {
        out.write_all(chunk)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

impl LcbList {
    /// Write the blocks as Mauve-style XMFA with rebuilt aligned rows.
    ///
    /// Rows of reverse blocks are reverse-complemented so that every
    /// region reads in its recorded orientation. Absent tracks get a
    /// `0-0` header and no sequence.
    pub fn write_xmfa<W: Write>(
        &self,
        out: &mut W,
        references: &ReferenceList,
        tracks: &TrackList,
        variants: &VariantList,
    ) -> io::Result<()> {
        writeln!(out, "#FormatVersion Mauve1")?;
        for (index, track) in tracks.iter().enumerate() {
            writeln!(out, "#Sequence{}File\t{}", index + 1, track.file)?;
            if !track.name.is_empty() {
                writeln!(out, "##SequenceHeader {}", track.name)?;
            }
            if track.size > 0 {
                writeln!(out, "##SequenceLength {}bp", track.size)?;
            }
        }
        writeln!(out, "#IntervalCount {}", self.len())?;

        for (cluster, lcb) in self.iter().enumerate() {
            let mut rows = reconstruct_rows(lcb, references, variants, tracks.len());
            if lcb.is_reverse() {
                rows.iter_mut().for_each(|row| reverse_complement_in_place(row));
            }
            for (track, row) in rows.iter().enumerate() {
                let region = lcb.regions.get(track).copied().unwrap_or_default();
                let strand = if region.reverse { '-' } else { '+' };
                if region.length == 0 {
                    writeln!(out, "> {}:0-0 {} cluster{}", track + 1, strand, cluster + 1)?;
                    continue;
                }
                writeln!(
                    out,
                    "> {}:{}-{} {} cluster{}",
                    track + 1,
                    region.position + 1,
                    region.position + region.length,
                    strand,
                    cluster + 1
                )?;
                write_wrapped(out, row, XMFA_WIDTH)?;
            }
            writeln!(out, "=")?;
        }
        out.flush()?;
        debug!(lcbs = self.len(), tracks = tracks.len(), "wrote XMFA");
        Ok(())
    }

    /// Write one aligned multi-FASTA record per track, concatenating the
    /// rebuilt rows of every block in reference order.
    pub fn write_mfa<W: Write>(
        &self,
        out: &mut W,
        references: &ReferenceList,
        tracks: &TrackList,
        variants: &VariantList,
    ) -> io::Result<()> {
        let mut rows = vec![Vec::new(); tracks.len()];
        for lcb in self.iter() {
            for (row, block_row) in rows
                .iter_mut()
                .zip(reconstruct_rows(lcb, references, variants, tracks.len()))
            {
                row.extend(block_row);
            }
        }
        for (track, row) in tracks.iter().zip(&rows) {
            writeln!(out, ">{}", track.file)?;
            write_wrapped(out, row, FASTA_WIDTH)?;
        }
        out.flush()
    }

    /// Write the concatenated rows like [`LcbList::write_mfa`] without the
    /// columns of filtered variants, and the reference coordinate of every
    /// kept column to `positions` as `name<TAB>position<TAB>offset` with a
    /// 1-based position. Returns the number of kept columns.
    pub fn write_filtered_mfa<W: Write, P: Write>(
        &self,
        out: &mut W,
        positions: &mut P,
        references: &ReferenceList,
        tracks: &TrackList,
        variants: &VariantList,
    ) -> io::Result<usize> {
        let mut rows = vec![Vec::new(); tracks.len()];
        let mut kept = Vec::new();
        for lcb in self.iter() {
            for_each_column(lcb, references, variants, |column| {
                if let Column::Variant(variant) = column {
                    if variant.filters != 0 {
                        return;
                    }
                }
                column.push_onto(&mut rows);
                kept.push(column.key());
            });
        }

        for (track, row) in tracks.iter().zip(&rows) {
            writeln!(out, ">{}", track.file)?;
            write_wrapped(out, row, FASTA_WIDTH)?;
        }
        for (sequence, position, offset) in &kept {
            let name = references.get(*sequence).map_or("", |reference| reference.name.as_str());
            writeln!(positions, "{name}\t{}\t{offset}", position + 1)?;
        }
        out.flush()?;
        positions.flush()?;
        debug!(columns = kept.len(), "wrote filtered multi-FASTA");
        Ok(kept.len())
    }

    /// Write the 1-based inclusive extent of every region, one block per
    /// row; reverse regions are negated and absent regions are `0 0`.
    pub fn write_backbone<W: Write>(&self, out: &mut W, tracks: &TrackList) -> io::Result<()> {
        let header: Vec<String> = (0..tracks.len())
            .map(|index| format!("seq{index}_leftend\tseq{index}_rightend"))
            .collect();
        writeln!(out, "{}", header.join("\t"))?;

        for lcb in self.iter() {
            let mut fields = Vec::with_capacity(tracks.len() * 2);
            for track in 0..tracks.len() {
                let region = lcb.regions.get(track).copied().unwrap_or_default();
                if region.length == 0 {
                    fields.extend(["0".to_string(), "0".to_string()]);
                    continue;
                }
                let sign = if region.reverse { "-" } else { "" };
                fields.push(format!("{sign}{}", region.position + 1));
                fields.push(format!("{sign}{}", region.position + region.length));
            }
            writeln!(out, "{}", fields.join("\t"))?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Region;

    fn fixture() -> (ReferenceList, TrackList, VariantList, LcbList) {
        let mut references = ReferenceList::new();
        references.add_reference("chr", "", b"ACGTACGTAC".to_vec());
        let tracks: TrackList = ["ref", "a"].into_iter().collect();
        let mut variants = VariantList::with_builtin_filters();
        variants
            .add_variants_from_alignment(&[b"-GTA-CG".to_vec(), b"TGTAGC-".to_vec()], 0, 2, false, &Default::default())
            .unwrap();
        variants.sort_variants();
        let mut lcbs = LcbList::new();
        lcbs.push(Lcb {
            sequence: 0,
            position: 2,
            length: 5,
            concordance: 0.0,
            regions: vec![
                Region { position: 2, length: 5, reverse: false },
                Region { position: 0, length: 5, reverse: true },
            ],
        });
        (references, tracks, variants, lcbs)
    }

    #[test]
    fn rows_are_rebuilt_from_reference_and_variants() {
        let (references, tracks, variants, lcbs) = fixture();
        let rows = reconstruct_rows(lcbs.get(0).unwrap(), &references, &variants, tracks.len());
        assert_eq!(rows, vec![b"-GTA-CG".to_vec(), b"TGTAGC-".to_vec()]);
    }

    #[test]
    fn xmfa_headers_and_terminator() {
        let (references, mut tracks, variants, lcbs) = fixture();
        tracks.set_size(0, 10);
        let mut out = Vec::new();
        lcbs.write_xmfa(&mut out, &references, &tracks, &variants).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "#FormatVersion Mauve1\n\
             #Sequence1File\tref\n\
             ##SequenceLength 10bp\n\
             #Sequence2File\ta\n\
             #IntervalCount 1\n\
             > 1:3-7 + cluster1\n-GTA-CG\n\
             > 2:1-5 - cluster1\nTGTAGC-\n\
             =\n"
        );
    }

    #[test]
    fn filtered_mfa_drops_filtered_columns_and_lists_positions() {
        let mut references = ReferenceList::new();
        references.add_reference("chr", "", b"ACGTACGTAC".to_vec());
        let tracks: TrackList = ["ref", "a"].into_iter().collect();
        let mut variants = VariantList::with_builtin_filters();
        variants
            .add_variants_from_alignment(&[b"CG-TA".to_vec(), b"CATT-".to_vec()], 0, 1, false, &Default::default())
            .unwrap();
        variants.sort_variants();
        let mut lcbs = LcbList::new();
        lcbs.push(Lcb {
            sequence: 0,
            position: 1,
            length: 4,
            concordance: 1.0,
            regions: vec![
                Region { position: 1, length: 4, reverse: false },
                Region { position: 0, length: 4, reverse: false },
            ],
        });

        let mut mfa = Vec::new();
        let mut positions = Vec::new();
        let kept = lcbs
            .write_filtered_mfa(&mut mfa, &mut positions, &references, &tracks, &variants)
            .unwrap();
        assert_eq!(kept, 3);
        assert_eq!(String::from_utf8(mfa).unwrap(), ">ref\nCGT\n>a\nCAT\n");
        assert_eq!(String::from_utf8(positions).unwrap(), "chr\t2\t0\nchr\t3\t0\nchr\t4\t0\n");
    }

    #[test]
    fn backbone_negates_reverse_regions() {
        let (_, tracks, _, mut lcbs) = fixture();
        lcbs.push(Lcb {
            sequence: 0,
            position: 8,
            length: 2,
            concordance: 1.0,
            regions: vec![Region { position: 8, length: 2, reverse: false }, Region::default()],
        });
        let mut out = Vec::new();
        lcbs.write_backbone(&mut out, &tracks).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "seq0_leftend\tseq0_rightend\tseq1_leftend\tseq1_rightend\n\
             3\t7\t-1\t-5\n\
             9\t10\t0\t0\n"
        );
    }

    #[test]
    fn blocks_spanning_references_continue_on_the_next() {
        let mut references = ReferenceList::new();
        references.add_reference("a", "", b"ACG".to_vec());
        references.add_reference("b", "", b"TT".to_vec());
        let lcbs = LcbList::single(&references, &[5, 5]);
        let rows = reconstruct_rows(lcbs.get(0).unwrap(), &references, &VariantList::new(), 2);
        assert_eq!(rows, vec![b"ACGTT".to_vec(), b"ACGTT".to_vec()]);
    }
}
