//! Aligned multi-FASTA scanner.
//!
//! The whole file is one block. The first record is the reference: its tag
//! names the reference sequence and the rest of its header line is the
//! description.

use std::io::BufRead;

use bio::io::fasta;
use tracing::debug;

use super::{AlignedSegment, AlignmentBlock, AlignmentError, Span};
use crate::genomics::ungapped_len;

/// The single block of an aligned multi-FASTA file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaAlignment {
    /// Tag of the first record.
    pub reference_name: String,
    /// Header text after the first record's tag.
    pub reference_description: String,
    /// One row per record, in file order.
    pub block: AlignmentBlock,
}

/// Scan an aligned multi-FASTA file.
pub fn read<R: BufRead>(reader: R) -> Result<MfaAlignment, AlignmentError> {
    let mut records: Vec<(String, Vec<u8>)> = Vec::new();
    let mut reference_description = String::new();

    for record in fasta::Reader::new(reader).records() {
        let record = record?;
        if records.is_empty() {
            reference_description = record.desc().unwrap_or_default().trim().to_string();
        }
        records.push((record.id().to_string(), record.seq().to_vec()));
    }

    let Some(reference_name) = records.first().map(|(tag, _)| tag.clone()) else {
        return Err(AlignmentError::MalformedBlock {
            line: 0,
            reason: "no sequences".to_string(),
        });
    };

    let segments: Vec<AlignedSegment> = records
        .into_iter()
        .map(|(track, aligned)| {
            let length = ungapped_len(&aligned);
            AlignedSegment {
                track,
                contig: None,
                span: Span::Forward { start: 0, length },
                contig_length: length,
                aligned,
            }
        })
        .collect();
    debug!(rows = segments.len(), "scanned aligned multi-FASTA");

    Ok(MfaAlignment {
        reference_name,
        reference_description,
        block: AlignmentBlock {
            core: true,
            line: 1,
            segments,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_record_names_the_reference() {
        let text = ">chr1 Example genome, complete\nAC-GT\nAC\n>b\nACCGTA-\n";
        let alignment = read(text.as_bytes()).unwrap();
        assert_eq!(alignment.reference_name, "chr1");
        assert_eq!(alignment.reference_description, "Example genome, complete");
        let rows: Vec<_> = alignment
            .block
            .segments
            .iter()
            .map(|segment| (segment.track.as_str(), segment.aligned.clone(), segment.span.length()))
            .collect();
        assert_eq!(
            rows,
            vec![("chr1", b"AC-GTAC".to_vec(), 6), ("b", b"ACCGTA-".to_vec(), 6)]
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            read("".as_bytes()),
            Err(AlignmentError::MalformedBlock { line: 0, .. })
        ));
        assert!(matches!(read("ACGT\n>a\n".as_bytes()), Err(AlignmentError::Io(_))));
    }
}
