use std::io::{self, BufRead};

use thiserror::Error;
use tracing::debug;

use super::codon::{translate, translate_reverse};
use super::reference::{ReferenceError, ReferenceList};

/// Errors raised while loading GenBank annotations.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// Underlying read failure.
    #[error("failed to read GenBank input: {0}")]
    Io(#[from] io::Error),

    /// The record has no `ORIGIN` sequence and no reference is loaded.
    #[error("no sequence in GenBank file ({file}) and no other reference loaded")]
    NoSequence {
        /// Source the record came from.
        file: String,
    },

    /// The record cannot be matched to a loaded reference.
    #[error("GenBank file ({file}) does not contain accession; cannot be matched to existing reference")]
    NoAccession {
        /// Source the record came from.
        file: String,
    },

    /// Accession lookup failed.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// A feature location could not be parsed.
    #[error("malformed feature location \"{location}\" in {file}")]
    BadLocation {
        /// Source the record came from.
        file: String,
        /// Offending location text.
        location: String,
    },
}

/// Half-open `[start, end)` interval on a reference sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnotationRegion {
    /// First base (0-based).
    pub start: u64,
    /// One past the last base.
    pub end: u64,
}

impl AnnotationRegion {
    /// Returns `true` when `position` lies inside the region.
    pub fn contains(&self, position: u64) -> bool {
        self.start <= position && position < self.end
    }
}

/// A gene feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Annotation {
    /// Reference sequence id.
    pub sequence: usize,
    /// Regions in reference order.
    pub regions: Vec<AnnotationRegion>,
    /// Gene lies on the complement strand.
    pub reverse: bool,
    /// `/locus_tag`.
    pub locus: String,
    /// `/gene`.
    pub name: String,
    /// `/product`.
    pub description: String,
}

impl Annotation {
    /// Returns `true` when `position` on `sequence` falls inside the gene.
    pub fn covers(&self, sequence: usize, position: u64) -> bool {
        self.sequence == sequence && self.regions.iter().any(|region| region.contains(position))
    }

    /// Amino acid encoded by the codon containing `position`, with the base
    /// at `position` replaced by `base`.
    ///
    /// Regions are joined into one coding sequence, so codons may straddle
    /// an intron. `None` is returned outside the gene, for a trailing
    /// partial codon or for an untranslatable codon.
    pub fn amino_acid_at(&self, reference: &[u8], position: u64, base: u8) -> Option<u8> {
        let length: u64 = self.regions.iter().map(|region| region.end - region.start).sum();
        let joined = self.joined_index(position)?;
        let strand_index = |index: u64| if self.reverse { length - 1 - index } else { index };

        let coding = strand_index(joined);
        let codon_start = coding - coding % 3;
        if codon_start + 3 > length {
            return None;
        }
        let mut positions = (codon_start..codon_start + 3)
            .map(|index| self.joined_position(strand_index(index)))
            .collect::<Option<Vec<u64>>>()?;
        if self.reverse {
            positions.reverse();
        }

        let mut codon = positions
            .iter()
            .map(|&at| reference.get(at as usize).copied())
            .collect::<Option<Vec<u8>>>()?;
        let slot = positions.iter().position(|&at| at == position)?;
        codon[slot] = base;
        if self.reverse {
            translate_reverse(&codon)
        } else {
            translate(&codon)
        }
    }

    /// Index of `position` in the joined regions.
    fn joined_index(&self, position: u64) -> Option<u64> {
        let mut before = 0;
        for region in &self.regions {
            if region.contains(position) {
                return Some(before + position - region.start);
            }
            before += region.end - region.start;
        }
        None
    }

    /// Reference position of a joined-region index.
    fn joined_position(&self, index: u64) -> Option<u64> {
        let mut rest = index;
        for region in &self.regions {
            let length = region.end - region.start;
            if rest < length {
                return Some(region.start + rest);
            }
            rest -= length;
        }
        None
    }
}

/// Gene annotations loaded from GenBank records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnotationList {
    annotations: Vec<Annotation>,
}

#[derive(Default)]
struct GenbankRecord {
    accession: Option<String>,
    locus: Option<String>,
    genes: Vec<Annotation>,
    sequence: Vec<u8>,
}

impl AnnotationList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of annotations.
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    /// Returns `true` when no annotation is loaded.
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Iterate annotations in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    /// Add an annotation.
    pub fn push(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// First annotation covering `position` on `sequence`.
    pub fn find(&self, sequence: usize, position: u64) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.covers(sequence, position))
    }

    /// Load `gene` features from GenBank text.
    ///
    /// With `create_references` each record's `ORIGIN` sequence becomes a new
    /// reference; otherwise records are matched to loaded references by
    /// accession. Returns the number of annotations added.
    pub fn read_genbank<R: BufRead>(
        &mut self,
        reader: R,
        file: &str,
        references: &mut ReferenceList,
        create_references: bool,
    ) -> Result<usize, AnnotationError> {
        let before = self.annotations.len();
        let mut record = GenbankRecord::default();
        let mut in_features = false;
        let mut in_origin = false;
        let mut open_product = false;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');

            if line.starts_with("//") {
                self.commit_record(std::mem::take(&mut record), file, references, create_references)?;
                in_features = false;
                in_origin = false;
                open_product = false;
                continue;
            }

            if in_origin {
                record.sequence.extend(
                    line.bytes()
                        .filter(u8::is_ascii_alphabetic)
                        .map(|base| base.to_ascii_uppercase()),
                );
                continue;
            }

            if let Some(rest) = line.strip_prefix("LOCUS") {
                record.locus = rest.split_whitespace().next().map(str::to_string);
            } else if let Some(rest) = line.strip_prefix("ACCESSION") {
                record.accession = rest.split_whitespace().next().map(str::to_string);
            } else if line.starts_with("FEATURES") {
                in_features = true;
            } else if line.starts_with("ORIGIN") {
                in_features = false;
                in_origin = true;
            } else if in_features {
                let token = line.trim_start();
                let indent = line.len() - token.len();

                if open_product {
                    if let Some(gene) = record.genes.last_mut() {
                        gene.description.push(' ');
                        gene.description.push_str(token.trim_end_matches('"'));
                    }
                    open_product = !token.ends_with('"');
                } else if indent == 5 {
                    if let Some(location) = token.strip_prefix("gene") {
                        let location = location.trim();
                        let (regions, reverse) = parse_location(location).ok_or_else(|| {
                            AnnotationError::BadLocation {
                                file: file.to_string(),
                                location: location.to_string(),
                            }
                        })?;
                        record.genes.push(Annotation {
                            regions,
                            reverse,
                            ..Annotation::default()
                        });
                    }
                } else if let Some(gene) = record.genes.last_mut() {
                    if let Some(value) = token.strip_prefix("/locus_tag=\"") {
                        gene.locus = value.trim_end_matches('"').to_string();
                    } else if let Some(value) = token.strip_prefix("/gene=\"") {
                        gene.name = value.trim_end_matches('"').to_string();
                    } else if let Some(value) = token.strip_prefix("/product=\"") {
                        gene.description = value.trim_end_matches('"').to_string();
                        open_product = !value.ends_with('"');
                    }
                }
            }
        }

        if record.locus.is_some() || !record.genes.is_empty() || !record.sequence.is_empty() {
            self.commit_record(record, file, references, create_references)?;
        }

        Ok(self.annotations.len() - before)
    }

    fn commit_record(
        &mut self,
        record: GenbankRecord,
        file: &str,
        references: &mut ReferenceList,
        create_references: bool,
    ) -> Result<(), AnnotationError> {
        let sequence = if create_references {
            if record.sequence.is_empty() {
                return Err(AnnotationError::NoSequence {
                    file: file.to_string(),
                });
            }
            let name = record
                .accession
                .or(record.locus)
                .unwrap_or_else(|| file.to_string());
            debug!(reference = %name, "creating reference from GenBank sequence");
            references.add_reference(name, "", record.sequence)
        } else {
            let accession = record.accession.ok_or_else(|| AnnotationError::NoAccession {
                file: file.to_string(),
            })?;
            references.index_of_accession(&accession)?
        };

        debug!(count = record.genes.len(), sequence, "loaded gene annotations");
        self.annotations
            .extend(record.genes.into_iter().map(|gene| Annotation { sequence, ..gene }));
        Ok(())
    }
}

/// Parse `a..b`, `complement(a..b)`, `join(a..b,c..d)` and nested
/// combinations into 0-based half-open regions.
fn parse_location(location: &str) -> Option<(Vec<AnnotationRegion>, bool)> {
    let mut rest = location.trim();
    let mut reverse = false;
    if let Some(inner) = rest.strip_prefix("complement(") {
        reverse = true;
        rest = inner.strip_suffix(')')?;
    }
    if let Some(inner) = rest.strip_prefix("join(").or_else(|| rest.strip_prefix("order(")) {
        rest = inner.strip_suffix(')')?;
    }

    let mut regions = Vec::new();
    for part in rest.split(',') {
        let part = part.trim();
        let (start, end) = match part.split_once("..") {
            Some((start, end)) => (start, end),
            None => (part, part),
        };
        let start: u64 = start.trim_start_matches('<').parse().ok()?;
        let end: u64 = end.trim_start_matches('>').parse().ok()?;
        if start == 0 || end < start {
            return None;
        }
        regions.push(AnnotationRegion { start: start - 1, end });
    }
    Some((regions, reverse))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENBANK: &str = "\
LOCUS       TEST01        24 bp    DNA     linear   BCT 01-JAN-2020
ACCESSION   CP000001
VERSION     CP000001.1
FEATURES             Location/Qualifiers
     source          1..24
     gene            1..9
                     /gene=\"abcA\"
                     /locus_tag=\"T_0001\"
     CDS             1..9
                     /product=\"first protein with a long
                     description\"
     gene            complement(13..21)
                     /locus_tag=\"T_0002\"
ORIGIN
        1 atgaaatag a cccatggcat tt
//
";

    #[test]
    fn genbank_creates_reference_and_genes() {
        let mut references = ReferenceList::new();
        let mut annotations = AnnotationList::new();
        let added = annotations
            .read_genbank(GENBANK.as_bytes(), "test.gbk", &mut references, true)
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(references.len(), 1);
        assert_eq!(references.get(0).unwrap().name, "CP000001");
        assert_eq!(references.get(0).unwrap().sequence, b"ATGAAATAGACCCATGGCATTT".to_vec());

        let first = annotations.find(0, 4).unwrap();
        assert_eq!(first.name, "abcA");
        assert_eq!(first.locus, "T_0001");
        assert_eq!(first.description, "first protein with a long description");
        assert!(!first.reverse);

        let second = annotations.find(0, 12).unwrap();
        assert!(second.reverse);
        assert_eq!(second.regions, vec![AnnotationRegion { start: 12, end: 21 }]);
        assert!(annotations.find(0, 10).is_none());
    }

    #[test]
    fn genbank_matches_existing_reference_by_accession() {
        let mut references = ReferenceList::new();
        references.add_reference("gi|1|gb|CP000001.1|", "", vec![b'A'; 24]);
        let mut annotations = AnnotationList::new();
        annotations
            .read_genbank(GENBANK.as_bytes(), "test.gbk", &mut references, false)
            .unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(annotations.len(), 2);
    }

    #[test]
    fn genbank_without_sequence_or_accession_fails() {
        let text = "LOCUS       X\nFEATURES             Location/Qualifiers\n//\n";
        let mut references = ReferenceList::new();
        let mut annotations = AnnotationList::new();
        assert!(matches!(
            annotations.read_genbank(text.as_bytes(), "x.gbk", &mut references, true),
            Err(AnnotationError::NoSequence { .. })
        ));
        assert!(matches!(
            annotations.read_genbank(text.as_bytes(), "x.gbk", &mut references, false),
            Err(AnnotationError::NoAccession { .. })
        ));
    }

    #[test]
    fn codon_impact_on_both_strands() {
        let reference = b"ATGAAATAGACCCATGGCATTT";
        let forward = Annotation {
            regions: vec![AnnotationRegion { start: 0, end: 9 }],
            ..Annotation::default()
        };
        // AAA (K) -> AGA (R)
        assert_eq!(forward.amino_acid_at(reference, 4, b'A'), Some(b'K'));
        assert_eq!(forward.amino_acid_at(reference, 4, b'G'), Some(b'R'));

        let reverse = Annotation {
            regions: vec![AnnotationRegion { start: 12, end: 21 }],
            reverse: true,
            ..Annotation::default()
        };
        // first codon of the gene is ATT on the forward strand, read as AAT (N)
        assert_eq!(reverse.amino_acid_at(reference, 19, b'T'), Some(b'N'));
        assert_eq!(reverse.amino_acid_at(reference, 19, b'A'), Some(b'I'));
        assert_eq!(reverse.amino_acid_at(reference, 18, b'C'), Some(b'K'));
    }

    #[test]
    fn codons_straddle_joined_regions() {
        // exons ATGA and AACCC around a GG intron
        let reference = b"ATGAGGAACCC";
        let regions = vec![
            AnnotationRegion { start: 0, end: 4 },
            AnnotationRegion { start: 6, end: 11 },
        ];
        let forward = Annotation {
            regions: regions.clone(),
            ..Annotation::default()
        };
        assert_eq!(forward.amino_acid_at(reference, 6, b'A'), Some(b'K'));
        assert_eq!(forward.amino_acid_at(reference, 6, b'G'), Some(b'R'));
        assert_eq!(forward.amino_acid_at(reference, 3, b'C'), Some(b'Q'));
        assert_eq!(forward.amino_acid_at(reference, 8, b'A'), Some(b'T'));
        assert_eq!(forward.amino_acid_at(reference, 4, b'A'), None);

        let reverse = Annotation {
            regions,
            reverse: true,
            ..Annotation::default()
        };
        // GGG TTT CAT on the complement strand
        assert_eq!(reverse.amino_acid_at(reference, 6, b'A'), Some(b'F'));
        assert_eq!(reverse.amino_acid_at(reference, 7, b'G'), Some(b'L'));
        assert_eq!(reverse.amino_acid_at(reference, 10, b'C'), Some(b'G'));
    }
}
