//! VCF emission and ingestion.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, BufRead, Write};

use noodles_vcf as nvcf;
use nvcf::variant::record::{AlternateBases, Filters};
use nvcf::variant::record_buf::info::field::Value as InfoValue;
use nvcf::variant::record_buf::samples::sample::Value as SampleValue;
use tracing::{debug, info};

use super::{Variant, VariantError, VariantList};
use crate::genomics::{AnnotationList, ReferenceList, TrackList, GAP, UNKNOWN};
use crate::tree::{NodeId, PhylogenyTree};

const FILE_FORMAT: &str = "##fileformat=VCFv4.3";
const SOURCE: &str = concat!("##source=harvest-", env!("CARGO_PKG_VERSION"));
const FIXED_COLUMNS: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT";
const PASS: &str = "PASS";
/// INFO key carrying the negative offset of a reference-gap row that
/// precedes its anchor base.
const OFFSET_KEY: &str = "OFFSET";

/// A subset of tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSet {
    members: Vec<bool>,
}

impl TrackSet {
    /// Set holding `members` out of `track_count` tracks. Indices beyond
    /// `track_count` are ignored.
    pub fn from_tracks(track_count: usize, members: impl IntoIterator<Item = usize>) -> Self {
        let mut flags = vec![false; track_count];
        for track in members {
            if let Some(flag) = flags.get_mut(track) {
                *flag = true;
            }
        }
        Self { members: flags }
    }

    /// Set holding every leaf under `node`.
    pub fn from_clade(tree: &PhylogenyTree, node: NodeId, track_count: usize) -> Self {
        Self::from_tracks(track_count, tree.clade_tracks(node))
    }

    /// Returns `true` when `track` is a member.
    pub fn contains(&self, track: usize) -> bool {
        self.members.get(track).copied().unwrap_or(false)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.iter().filter(|&&member| member).count()
    }

    /// Returns `true` when the set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn split<'a>(&'a self, alleles: &'a [u8]) -> (impl Iterator<Item = u8> + 'a, impl Iterator<Item = u8> + 'a) {
        let inside = alleles
            .iter()
            .enumerate()
            .filter(move |(track, _)| self.contains(*track))
            .map(|(_, &allele)| allele);
        let outside = alleles
            .iter()
            .enumerate()
            .filter(move |(track, _)| !self.contains(*track))
            .map(|(_, &allele)| allele);
        (inside, outside)
    }
}

/// Which variants a VCF emission includes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VcfSelection {
    /// Every variant.
    #[default]
    All,
    /// Variants whose alleles are not all equal inside the set.
    Internal(TrackSet),
    /// Variants uniform inside the set whose allele appears in no track
    /// outside it. Requires a non-empty outside.
    Signature(TrackSet),
}

impl VcfSelection {
    /// Returns `true` when `variant` is selected.
    pub fn selects(&self, variant: &Variant) -> bool {
        match self {
            VcfSelection::All => true,
            VcfSelection::Internal(set) => {
                let (mut inside, _) = set.split(&variant.alleles);
                match inside.next() {
                    Some(first) => inside.any(|allele| allele != first),
                    None => false,
                }
            }
            VcfSelection::Signature(set) => {
                let (mut inside, mut outside) = set.split(&variant.alleles);
                let Some(first) = inside.next() else {
                    return false;
                };
                if inside.any(|allele| allele != first) {
                    return false;
                }
                let mut any_outside = false;
                let distinct = outside.all(|allele| {
                    any_outside = true;
                    allele != first
                });
                any_outside && distinct
            }
        }
    }
}

/// Options for [`VariantList::write_vcf`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcfOptions {
    /// Emit indel columns.
    pub indels: bool,
    /// Row selection.
    pub selection: VcfSelection,
}

impl VariantList {
    /// Write selected variants as VCF with one GT column per track.
    ///
    /// Returns the number of data rows written.
    pub fn write_vcf<W: Write>(
        &self,
        out: &mut W,
        references: &ReferenceList,
        tracks: &TrackList,
        annotations: &AnnotationList,
        options: &VcfOptions,
    ) -> io::Result<usize> {
        writeln!(out, "{FILE_FORMAT}")?;
        writeln!(out, "{SOURCE}")?;
        if let Some(first) = references.get(0) {
            writeln!(out, "##reference={}", first.name)?;
        }
        for reference in references.iter() {
            writeln!(out, "##contig=<ID={},length={}>", reference.name, reference.len())?;
        }
        for filter in self.filters() {
            writeln!(out, "##FILTER=<ID={},Description=\"{}\">", filter.name, filter.description)?;
        }
        if !annotations.is_empty() {
            writeln!(out, "##INFO=<ID=LOCUS,Number=1,Type=String,Description=\"Locus tag of the overlapping gene\">")?;
            writeln!(out, "##INFO=<ID=GENE,Number=1,Type=String,Description=\"Name of the overlapping gene\">")?;
            writeln!(out, "##INFO=<ID=AA,Number=1,Type=String,Description=\"Reference and alternate amino acids\">")?;
        }
        if self.iter().any(|variant| variant.offset < 0) {
            writeln!(
                out,
                "##INFO=<ID={OFFSET_KEY},Number=1,Type=Integer,Description=\"Reference gap column before the anchor base\">"
            )?;
        }
        writeln!(out, "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">")?;
        write!(out, "{FIXED_COLUMNS}")?;
        for track in tracks.iter() {
            write!(out, "\t{}", track.file)?;
        }
        writeln!(out)?;

        let mut rows = 0;
        for variant in self.iter() {
            if !options.indels && variant.is_indel() {
                continue;
            }
            if !options.selection.selects(variant) {
                continue;
            }
            self.write_vcf_row(out, variant, references, annotations)?;
            rows += 1;
        }
        out.flush()?;
        debug!(rows, "wrote VCF");
        Ok(rows)
    }

    fn write_vcf_row<W: Write>(
        &self,
        out: &mut W,
        variant: &Variant,
        references: &ReferenceList,
        annotations: &AnnotationList,
    ) -> io::Result<()> {
        let mut alternates: Vec<u8> = Vec::new();
        for &allele in &variant.alleles {
            if allele != variant.reference && !alternates.contains(&allele) {
                alternates.push(allele);
            }
        }

        let chrom = references
            .get(variant.sequence)
            .map_or_else(|| variant.sequence.to_string(), |reference| reference.name.clone());
        let alt = if alternates.is_empty() {
            ".".to_string()
        } else {
            join_chars(&alternates, ',')
        };
        let filter = if variant.filters == 0 {
            "PASS".to_string()
        } else {
            self.filter_names(variant.filters).join(":")
        };
        let mut fields = Vec::new();
        if variant.offset < 0 {
            fields.push(format!("{OFFSET_KEY}={}", variant.offset));
        }
        fields.extend(annotation_info(variant, &alternates, references, annotations));
        let info = if fields.is_empty() {
            ".".to_string()
        } else {
            fields.join(";")
        };

        write!(
            out,
            "{chrom}\t{pos}\t.\t{reference}\t{alt}\t{quality}\t{filter}\t{info}\tGT",
            pos = variant.position + 1,
            reference = variant.reference as char,
            quality = variant.quality,
        )?;
        for &allele in &variant.alleles {
            let genotype = alternates
                .iter()
                .position(|&alternate| alternate == allele)
                .map_or(0, |index| index + 1);
            write!(out, "\t{genotype}")?;
        }
        writeln!(out)
    }

    /// Render selected variants to a VCF string.
    pub fn render_vcf(
        &self,
        references: &ReferenceList,
        tracks: &TrackList,
        annotations: &AnnotationList,
        options: &VcfOptions,
    ) -> Result<String, VariantError> {
        let mut buffer = Vec::new();
        self.write_vcf(&mut buffer, references, tracks, annotations, options)?;
        String::from_utf8(buffer).map_err(|_| {
            VariantError::Io(io::Error::new(io::ErrorKind::InvalidData, "rendered VCF is not valid UTF-8"))
        })
    }

    /// Replace the list with the records of a VCF file.
    ///
    /// `##FILTER` lines register filters in order. Sample columns resolve to
    /// tracks by file name, or create tracks when `tracks` is empty. `CHROM`
    /// resolves against `references`; when no reference is loaded, one is
    /// built per `##contig` line on an `N` background of the declared length
    /// and filled in from `REF` bases.
    pub fn read_vcf<R: BufRead>(
        &mut self,
        reader: R,
        references: &mut ReferenceList,
        tracks: &mut TrackList,
    ) -> Result<usize, VariantError> {
        self.clear();
        let mut reader = nvcf::io::Reader::new(reader);
        let header = reader.read_header()?;

        let mut flags_by_name: HashMap<String, u64> = HashMap::new();
        for (name, filter) in header.filters() {
            if name == PASS {
                continue;
            }
            let flag = self.add_filter(name, filter.description())?;
            flags_by_name.insert(name.clone(), flag);
        }

        let create_references = references.is_empty();
        if create_references {
            for (name, contig) in header.contigs() {
                if references.index_of(name).is_err() {
                    references.add_reference(name.as_str(), "", vec![UNKNOWN; contig.length().unwrap_or(0)]);
                }
            }
        }

        let create_tracks = tracks.is_empty();
        let sample_tracks = header
            .sample_names()
            .iter()
            .map(|name| {
                if create_tracks {
                    Ok(tracks.index_or_add(name))
                } else {
                    tracks.index_by_file(name)
                }
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let mut merged: BTreeMap<(usize, u64, i32), Variant> = BTreeMap::new();
        let mut group: Vec<VcfRecord> = Vec::new();
        let mut buffer = nvcf::variant::RecordBuf::default();
        let mut number = 0;

        while reader.read_record_buf(&header, &mut buffer)? != 0 {
            number += 1;
            let record = self.convert_record(
                &buffer,
                number,
                &header,
                sample_tracks.len(),
                references,
                create_references,
                &mut flags_by_name,
            )?;
            if group
                .last()
                .map_or(false, |last| (last.sequence, last.position) != (record.sequence, record.position))
            {
                merge_group(&mut group, &mut merged, &sample_tracks, tracks)?;
            }
            group.push(record);
        }
        merge_group(&mut group, &mut merged, &sample_tracks, tracks)?;

        self.variants = merged.into_values().collect();
        self.pad_alleles(tracks.len());
        info!(variants = self.len(), filters = self.filters().len(), "loaded VCF");
        Ok(self.len())
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_record(
        &mut self,
        record: &nvcf::variant::RecordBuf,
        number: usize,
        header: &nvcf::Header,
        sample_count: usize,
        references: &mut ReferenceList,
        create_references: bool,
        flags_by_name: &mut HashMap<String, u64>,
    ) -> Result<VcfRecord, VariantError> {
        let chrom = record.reference_sequence_name();
        let sequence = match references.index_of(chrom) {
            Ok(sequence) => sequence,
            Err(_) if create_references => {
                return Err(invalid(number, format!("CHROM \"{chrom}\" has no ##contig line")));
            }
            Err(error) => return Err(error.into()),
        };
        let position = record
            .variant_start()
            .map(|start| start.get() as u64 - 1)
            .ok_or_else(|| invalid(number, "missing POS"))?;

        let reference = parse_allele(record.reference_bases(), number)?;
        let alternates = record
            .alternate_bases()
            .iter()
            .map(|allele| parse_allele(allele?, number))
            .collect::<Result<Vec<_>, _>>()?;

        let quality = record
            .quality_score()
            .map_or(0, |score| score.max(0.0).round() as u32);

        let mut filters = 0;
        let record_filters = record.filters();
        if !record_filters.is_pass() {
            for names in record_filters.iter(header) {
                for name in names?.split(':').filter(|name| !name.is_empty()) {
                    let flag = match flags_by_name.get(name) {
                        Some(&flag) => flag,
                        None => {
                            let flag = self.add_filter(name, "")?;
                            flags_by_name.insert(name.to_string(), flag);
                            flag
                        }
                    };
                    filters |= flag;
                }
            }
        }

        let offset = match record.info().as_ref().get(OFFSET_KEY) {
            Some(Some(InfoValue::Integer(offset))) if *offset < 0 && reference == [GAP] => Some(*offset),
            Some(_) => return Err(invalid(number, "OFFSET must be a negative integer on a gap row")),
            None => None,
        };

        let mut genotypes = Vec::with_capacity(sample_count);
        if sample_count > 0 {
            let samples = record.samples();
            let gt = samples
                .keys()
                .as_ref()
                .get_index_of("GT")
                .ok_or_else(|| invalid(number, "FORMAT has no GT key"))?;
            for sample in samples.values() {
                let genotype = match sample.values().get(gt) {
                    Some(Some(value)) => genotype_allele(value).map_err(|reason| invalid(number, reason))?,
                    _ => None,
                };
                if let Some(index) = genotype {
                    if index > alternates.len() {
                        return Err(invalid(number, format!("genotype {index} has no allele")));
                    }
                }
                genotypes.push(genotype);
            }
            if genotypes.len() != sample_count {
                return Err(invalid(
                    number,
                    format!("expected {sample_count} samples, found {}", genotypes.len()),
                ));
            }
        }

        let Some(entry) = references.get_mut(sequence) else {
            return Err(invalid(number, format!("CHROM \"{chrom}\" is not loaded")));
        };
        let start = position as usize;
        let length = entry.sequence.len();
        let Some(window) = entry.sequence.get_mut(start..start + reference.len()) else {
            return Err(invalid(
                number,
                format!("POS {} runs past the {length}-base sequence \"{chrom}\"", position + 1),
            ));
        };
        if create_references {
            for (slot, &base) in window.iter_mut().zip(&reference) {
                if base != GAP {
                    *slot = base;
                }
            }
        }

        Ok(VcfRecord {
            record: number,
            sequence,
            position,
            offset,
            reference,
            alternates,
            quality,
            filters,
            genotypes,
        })
    }
}

/// One parsed data record.
struct VcfRecord {
    record: usize,
    sequence: usize,
    position: u64,
    /// Explicit column offset of a leading reference-gap row.
    offset: Option<i32>,
    reference: Vec<u8>,
    alternates: Vec<Vec<u8>>,
    quality: u32,
    filters: u64,
    genotypes: Vec<Option<usize>>,
}

/// One expanded alignment column: its reference character and the
/// character each allele index (0 = REF) contributes.
struct Column {
    position: u64,
    offset: i32,
    reference: u8,
    by_allele: Vec<u8>,
    required: bool,
}

impl VcfRecord {
    fn is_reference_gap(&self) -> bool {
        self.reference == [GAP]
    }

    /// Split the record into single-character columns.
    fn expand(&self, gap_offset: i32) -> Result<Vec<Column>, VariantError> {
        let reference = &self.reference;
        let alleles: Vec<&[u8]> = std::iter::once(reference.as_slice())
            .chain(self.alternates.iter().map(Vec::as_slice))
            .collect();

        if alleles.iter().all(|allele| allele.len() == 1) {
            let offset = if self.is_reference_gap() { gap_offset } else { 0 };
            return Ok(vec![Column {
                position: self.position,
                offset,
                reference: reference[0],
                by_allele: alleles.iter().map(|allele| allele[0]).collect(),
                required: true,
            }]);
        }

        for alternate in &self.alternates {
            if alternate.len() != reference.len()
                && ((reference.len() > 1 && alternate.len() > 1) || alternate[0] != reference[0])
            {
                return Err(VariantError::CompoundVariant { record: self.record });
            }
        }

        let columns = if reference.len() > 1 {
            (0..reference.len())
                .map(|index| Column {
                    position: self.position + index as u64,
                    offset: 0,
                    reference: reference[index],
                    by_allele: alleles
                        .iter()
                        .map(|allele| {
                            if allele.len() == reference.len() {
                                allele[index]
                            } else if index == 0 {
                                allele[0]
                            } else {
                                GAP
                            }
                        })
                        .collect(),
                    required: false,
                })
                .collect()
        } else {
            let longest = alleles.iter().map(|allele| allele.len()).max().unwrap_or(1);
            (0..longest)
                .map(|index| Column {
                    position: self.position,
                    offset: index as i32,
                    reference: if index == 0 { reference[0] } else { GAP },
                    by_allele: alleles
                        .iter()
                        .map(|allele| allele.get(index).copied().unwrap_or(GAP))
                        .collect(),
                    required: false,
                })
                .collect()
        };
        Ok(columns)
    }
}

/// Expand the records sharing one anchor position and fold them into
/// `merged`. Reference-gap rows carrying `OFFSET` keep it. Other
/// single-character reference-gap rows before the first anchored row get
/// negative offsets, the rest count up from 1.
fn merge_group(
    group: &mut Vec<VcfRecord>,
    merged: &mut BTreeMap<(usize, u64, i32), Variant>,
    sample_tracks: &[usize],
    tracks: &TrackList,
) -> Result<(), VariantError> {
    let anchor = group.iter().position(|record| !record.is_reference_gap());
    let leading = anchor.unwrap_or(0);
    let mut trailing = 0;
    let track_count = tracks.len();

    for (index, record) in group.drain(..).enumerate() {
        let gap_offset = if !record.is_reference_gap() {
            0
        } else if let Some(offset) = record.offset {
            offset
        } else if anchor.is_some() && index < leading {
            index as i32 - leading as i32
        } else {
            trailing += 1;
            trailing
        };

        for column in record.expand(gap_offset)? {
            let key = (record.sequence, column.position, column.offset);
            let sample_alleles: Vec<(usize, u8)> = record
                .genotypes
                .iter()
                .zip(sample_tracks)
                .map(|(genotype, &track)| {
                    (track, genotype.map_or(column.reference, |allele| column.by_allele[allele]))
                })
                .collect();

            if !column.required
                && !merged.contains_key(&key)
                && sample_alleles.iter().all(|&(_, allele)| allele == column.reference)
            {
                continue;
            }

            let entry = merged.entry(key).or_insert_with(|| Variant {
                sequence: record.sequence,
                position: column.position,
                offset: column.offset,
                reference: column.reference,
                alleles: vec![column.reference; track_count],
                filters: 0,
                quality: 0,
            });
            entry.filters |= record.filters;
            entry.quality = entry.quality.max(record.quality);

            for (track, allele) in sample_alleles {
                if allele == entry.reference {
                    continue;
                }
                let previous = entry.alleles[track];
                if previous != entry.reference && previous != allele {
                    return Err(VariantError::ConflictingVariant {
                        record: record.record,
                        track: tracks.get(track).map(|track| track.file.clone()).unwrap_or_default(),
                        previous: previous as char,
                        new: allele as char,
                    });
                }
                entry.alleles[track] = allele;
            }
        }
    }
    Ok(())
}

fn parse_allele(text: &str, record: usize) -> Result<Vec<u8>, VariantError> {
    if text.is_empty() {
        return Err(invalid(record, "empty allele"));
    }
    if text.starts_with('<') || text.contains('[') || text.contains(']') {
        return Err(VariantError::CompoundVariant { record });
    }
    if text == "*" {
        return Ok(vec![GAP]);
    }
    Ok(text.to_ascii_uppercase().into_bytes())
}

/// Allele index of the first haplotype, `None` when missing.
fn genotype_allele(value: &SampleValue) -> Result<Option<usize>, String> {
    match value {
        SampleValue::Genotype(genotype) => Ok(genotype.as_ref().first().and_then(|allele| allele.position())),
        SampleValue::Integer(index) => usize::try_from(*index)
            .map(Some)
            .map_err(|_| format!("invalid genotype \"{index}\"")),
        SampleValue::String(text) => match text.split(['/', '|']).next().unwrap_or(".") {
            "." => Ok(None),
            first => first
                .parse()
                .map(Some)
                .map_err(|_| format!("invalid genotype \"{text}\"")),
        },
        other => Err(format!("invalid genotype {other:?}")),
    }
}

fn invalid(record: usize, reason: impl Into<String>) -> VariantError {
    VariantError::InvalidRecord {
        record,
        reason: reason.into(),
    }
}

fn join_chars(chars: &[u8], separator: char) -> String {
    let mut joined = String::with_capacity(chars.len() * 2);
    for (index, &byte) in chars.iter().enumerate() {
        if index > 0 {
            joined.push(separator);
        }
        joined.push(byte as char);
    }
    joined
}

/// `LOCUS`/`GENE`/`AA` INFO fields for the gene covering `variant`.
fn annotation_info(
    variant: &Variant,
    alternates: &[u8],
    references: &ReferenceList,
    annotations: &AnnotationList,
) -> Vec<String> {
    let Some(gene) = annotations.find(variant.sequence, variant.position) else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    if !gene.locus.is_empty() {
        fields.push(format!("LOCUS={}", gene.locus));
    }
    if !gene.name.is_empty() {
        fields.push(format!("GENE={}", gene.name));
    }
    if !variant.is_indel() && variant.offset == 0 {
        if let Some(reference) = references.get(variant.sequence) {
            let translate = |base| gene.amino_acid_at(&reference.sequence, variant.position, base);
            if let Some(original) = translate(variant.reference) {
                let changed: Vec<u8> = alternates
                    .iter()
                    .map(|&base| translate(base).unwrap_or(b'?'))
                    .collect();
                fields.push(format!("AA={}>{}", original as char, join_chars(&changed, ',')));
            }
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{Annotation, AnnotationRegion};
    use crate::variant::{FILTER_INDEL, FILTER_N};

    fn fixture() -> (ReferenceList, TrackList, VariantList) {
        let mut references = ReferenceList::new();
        references.add_reference("chr", "", b"ATGAAATAG".to_vec());
        let tracks: TrackList = ["ref", "a", "b", "c"].into_iter().collect();
        let mut variants = VariantList::with_builtin_filters();
        let rows = [
            (4, 0, b'A', *b"AGGA", 0),
            (5, 0, b'A', *b"ACAA", FILTER_N),
            (5, 1, b'-', *b"-T--", FILTER_INDEL),
            (7, 0, b'A', *b"AATT", 0),
        ];
        for (position, offset, reference, alleles, filters) in rows {
            variants.push(Variant {
                sequence: 0,
                position,
                offset,
                reference,
                alleles: alleles.to_vec(),
                filters,
                quality: 0,
            });
        }
        (references, tracks, variants)
    }

    fn positions(text: &str) -> Vec<String> {
        text.lines()
            .filter(|line| !line.starts_with('#'))
            .map(|line| line.split('\t').nth(1).unwrap().to_string())
            .collect()
    }

    #[test]
    fn writes_header_rows_and_genotypes() {
        let (references, tracks, variants) = fixture();
        let text = variants
            .render_vcf(&references, &tracks, &AnnotationList::new(), &VcfOptions::default())
            .unwrap();
        assert!(text.starts_with("##fileformat=VCFv4.3\n"));
        assert!(text.contains("##contig=<ID=chr,length=9>\n"));
        assert!(text.contains("##FILTER=<ID=IND,Description=\"Indel\">\n"));
        assert!(text.contains("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tref\ta\tb\tc\n"));
        assert!(text.contains("chr\t5\t.\tA\tG\t0\tPASS\t.\tGT\t0\t1\t1\t0\n"));
        assert!(text.contains("chr\t6\t.\tA\tC\t0\tN\t.\tGT\t0\t1\t0\t0\n"));
        assert_eq!(positions(&text), vec!["5", "6", "8"]);
    }

    #[test]
    fn indels_are_opt_in() {
        let (references, tracks, variants) = fixture();
        let options = VcfOptions {
            indels: true,
            ..VcfOptions::default()
        };
        let text = variants
            .render_vcf(&references, &tracks, &AnnotationList::new(), &options)
            .unwrap();
        assert!(text.contains("chr\t6\t.\t-\tT\t0\tIND\t.\tGT\t0\t1\t0\t0\n"));
    }

    #[test]
    fn internal_and_signature_selection() {
        let (references, tracks, variants) = fixture();
        let render = |selection| {
            let options = VcfOptions {
                indels: false,
                selection,
            };
            positions(
                &variants
                    .render_vcf(&references, &tracks, &AnnotationList::new(), &options)
                    .unwrap(),
            )
        };

        assert_eq!(render(VcfSelection::Internal(TrackSet::from_tracks(4, [1, 2]))), vec!["6", "8"]);
        assert_eq!(render(VcfSelection::Internal(TrackSet::from_tracks(4, [2, 3]))), vec!["5"]);
        assert_eq!(render(VcfSelection::Signature(TrackSet::from_tracks(4, [1, 2]))), vec!["5"]);
        assert_eq!(render(VcfSelection::Signature(TrackSet::from_tracks(4, [2, 3]))), vec!["8"]);
        assert!(render(VcfSelection::Signature(TrackSet::from_tracks(4, []))).is_empty());
        assert!(render(VcfSelection::Signature(TrackSet::from_tracks(4, [0, 1, 2, 3]))).is_empty());
    }

    #[test]
    fn annotations_add_amino_acid_changes() {
        let (references, tracks, variants) = fixture();
        let mut annotations = AnnotationList::new();
        annotations.push(Annotation {
            sequence: 0,
            regions: vec![AnnotationRegion { start: 0, end: 9 }],
            locus: "T_0001".to_string(),
            name: "abcA".to_string(),
            ..Annotation::default()
        });
        let text = variants
            .render_vcf(&references, &tracks, &annotations, &VcfOptions::default())
            .unwrap();
        assert!(text.contains("##INFO=<ID=AA,"));
        // AAA -> AGA at the second codon
        assert!(text.contains("\tPASS\tLOCUS=T_0001;GENE=abcA;AA=K>R\tGT\t"));
        // TAG -> TTG turns the stop codon into leucine
        assert!(text.contains("\tLOCUS=T_0001;GENE=abcA;AA=*>L\tGT\t0\t0\t1\t1"));
    }

    #[test]
    fn reads_its_own_output() {
        let (references, tracks, variants) = fixture();
        let options = VcfOptions {
            indels: true,
            ..VcfOptions::default()
        };
        let text = variants
            .render_vcf(&references, &tracks, &AnnotationList::new(), &options)
            .unwrap();

        let mut loaded = VariantList::new();
        let mut loaded_references = references.clone();
        let mut loaded_tracks = tracks.clone();
        loaded
            .read_vcf(text.as_bytes(), &mut loaded_references, &mut loaded_tracks)
            .unwrap();
        assert_eq!(loaded.as_slice(), variants.as_slice());
        assert_eq!(loaded.filters(), variants.filters());
    }

    #[test]
    fn anchored_indels_expand_into_gap_columns() {
        let text = "\
##fileformat=VCFv4.3
##contig=<ID=chr,length=10>
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tx\ty
chr\t2\t.\tAT\tA\t30\tPASS\t.\tGT\t0\t1
chr\t5\t.\tG\tGCC\t.\t.\t.\tGT\t1\t0
";
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        let mut variants = VariantList::new();
        variants.read_vcf(text.as_bytes(), &mut references, &mut tracks).unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(&references.get(0).unwrap().sequence[..6], b"NATNGN");
        let keys: Vec<_> = variants
            .iter()
            .map(|variant| (variant.position, variant.offset, variant.reference, variant.alleles.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (2, 0, b'T', b"T-".to_vec()),
                (4, 1, b'-', b"C-".to_vec()),
                (4, 2, b'-', b"C-".to_vec()),
            ]
        );
        assert_eq!(variants.get(0).unwrap().quality, 30);
    }

    #[test]
    fn compound_and_conflicting_records_fail() {
        let header = "##fileformat=VCFv4.3\n##contig=<ID=chr,length=5>\n\
                      #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tx\n";
        let compound = format!("{header}chr\t2\t.\tAT\tGCC\t.\t.\t.\tGT\t1\n");
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        assert!(matches!(
            VariantList::new().read_vcf(compound.as_bytes(), &mut references, &mut tracks),
            Err(VariantError::CompoundVariant { record: 1 })
        ));

        let conflicting = format!("{header}chr\t2\t.\tA\tC\t.\t.\t.\tGT\t1\nchr\t2\t.\tA\tG\t.\t.\t.\tGT\t1\n");
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        match VariantList::new().read_vcf(conflicting.as_bytes(), &mut references, &mut tracks) {
            Err(VariantError::ConflictingVariant { record, track, previous, new }) => {
                assert_eq!((record, track.as_str(), previous, new), (2, "x", 'C', 'G'));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn unknown_samples_are_rejected_when_tracks_exist() {
        let text = "##fileformat=VCFv4.3\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tz\n";
        let mut references = ReferenceList::new();
        let mut tracks: TrackList = ["x"].into_iter().collect();
        assert!(matches!(
            VariantList::new().read_vcf(text.as_bytes(), &mut references, &mut tracks),
            Err(VariantError::Track(_))
        ));
    }

    #[test]
    fn leading_gap_rows_keep_their_offset() {
        let mut references = ReferenceList::new();
        references.add_reference("chr", "", b"ACGT".to_vec());
        let tracks: TrackList = ["ref", "a"].into_iter().collect();
        let mut variants = VariantList::with_builtin_filters();
        for (offset, alleles) in [(-2, *b"-G"), (-1, *b"-T")] {
            variants.push(Variant {
                sequence: 0,
                position: 0,
                offset,
                reference: GAP,
                alleles: alleles.to_vec(),
                filters: FILTER_INDEL,
                quality: 0,
            });
        }
        let options = VcfOptions {
            indels: true,
            ..VcfOptions::default()
        };
        let text = variants
            .render_vcf(&references, &tracks, &AnnotationList::new(), &options)
            .unwrap();
        assert!(text.contains("##INFO=<ID=OFFSET,Number=1,Type=Integer,"));
        assert!(text.contains("chr\t1\t.\t-\tT\t0\tIND\tOFFSET=-1\tGT\t0\t1\n"));

        let mut loaded = VariantList::new();
        let mut loaded_references = references.clone();
        let mut loaded_tracks = TrackList::new();
        loaded
            .read_vcf(text.as_bytes(), &mut loaded_references, &mut loaded_tracks)
            .unwrap();
        assert_eq!(loaded.as_slice(), variants.as_slice());
    }

    #[test]
    fn records_past_the_declared_contig_are_rejected() {
        let text = "##fileformat=VCFv4.3\n##contig=<ID=chr,length=10>\n\
                    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tx\n\
                    chr\t4000000000\t.\tA\tC\t.\t.\t.\tGT\t1\n";
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        assert!(matches!(
            VariantList::new().read_vcf(text.as_bytes(), &mut references, &mut tracks),
            Err(VariantError::InvalidRecord { record: 1, .. })
        ));
        assert_eq!(references.get(0).unwrap().len(), 10);

        let undeclared = "##fileformat=VCFv4.3\n\
                          #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tx\n\
                          chrX\t3\t.\tA\tC\t.\t.\t.\tGT\t1\n";
        let mut references = ReferenceList::new();
        let mut tracks = TrackList::new();
        assert!(matches!(
            VariantList::new().read_vcf(undeclared.as_bytes(), &mut references, &mut tracks),
            Err(VariantError::InvalidRecord { record: 1, .. })
        ));
    }
}
