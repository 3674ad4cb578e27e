//! XMFA (extended multi-FASTA) scanner.
//!
//! Header comments name the aligned sequences; each block lists segments as
//! `> n:start-end ± comment` followed by aligned text and ends with `=`.
//! With `#FormatVersion Mauve*` coordinates are 1-based and inclusive, and
//! reverse-strand segments keep forward coordinates. A block is core when
//! every declared sequence has a non-empty segment in it.

use std::io::BufRead;

use tracing::debug;

use super::{AlignedSegment, AlignmentBlock, AlignmentError, Span};
use crate::genomics::basename;

/// One sequence declared in the XMFA header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmfaSequence {
    /// Track file name.
    pub file: String,
    /// `##SequenceHeader` text.
    pub header: Option<String>,
    /// `##SequenceLength` in bases.
    pub length: Option<u64>,
}

/// Header metadata and blocks of an XMFA file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmfaAlignment {
    /// Declared sequences in header order.
    pub sequences: Vec<XmfaSequence>,
    /// Blocks in file order.
    pub blocks: Vec<AlignmentBlock>,
}

struct PendingSegment {
    sequence: usize,
    start: u64,
    length: u64,
    reverse: bool,
    aligned: Vec<u8>,
}

/// Scan an XMFA file.
pub fn read<R: BufRead>(reader: R) -> Result<XmfaAlignment, AlignmentError> {
    let mut alignment = XmfaAlignment::default();
    let mut one_based = false;
    let mut segments: Vec<PendingSegment> = Vec::new();
    let mut block_line = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        let number = index + 1;

        if let Some(comment) = line.strip_prefix('#') {
            parse_header(comment, &mut alignment.sequences, &mut one_based);
        } else if let Some(header) = line.strip_prefix('>') {
            if segments.is_empty() {
                block_line = number;
            }
            segments.push(parse_segment_header(header, number, one_based)?);
        } else if line.starts_with('=') {
            if !segments.is_empty() {
                let block = close_block(std::mem::take(&mut segments), block_line, &mut alignment.sequences);
                alignment.blocks.push(block);
            }
        } else if let Some(segment) = segments.last_mut() {
            segment.aligned.extend(line.trim().bytes());
        } else if !line.trim().is_empty() {
            return Err(malformed(number, "sequence data outside a segment"));
        }
    }

    if !segments.is_empty() {
        let block = close_block(segments, block_line, &mut alignment.sequences);
        alignment.blocks.push(block);
    }

    let expected = alignment.sequences.len();
    for block in &mut alignment.blocks {
        block.core = expected > 0 && block.segments.len() == expected;
    }
    debug!(
        sequences = expected,
        blocks = alignment.blocks.len(),
        core = alignment.blocks.iter().filter(|block| block.core).count(),
        "scanned XMFA"
    );
    Ok(alignment)
}

fn parse_header(comment: &str, sequences: &mut Vec<XmfaSequence>, one_based: &mut bool) {
    if let Some(version) = comment.strip_prefix("FormatVersion ") {
        *one_based = version.trim().starts_with("Mauve");
    } else if let Some(file) = comment.strip_prefix("#SequenceFile ") {
        sequences.push(XmfaSequence {
            file: file.trim().to_string(),
            ..XmfaSequence::default()
        });
    } else if let Some(header) = comment.strip_prefix("#SequenceHeader ") {
        if let Some(sequence) = sequences.last_mut() {
            sequence.header = Some(header.trim().trim_start_matches('>').to_string());
        }
    } else if let Some(length) = comment.strip_prefix("#SequenceLength ") {
        if let Some(sequence) = sequences.last_mut() {
            sequence.length = length.trim().trim_end_matches("bp").parse().ok();
        }
    } else if let Some(rest) = comment.strip_prefix("Sequence") {
        // #Sequence<n>File<TAB>path
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        if let Some(file) = rest.strip_prefix("File\t") {
            sequences.push(XmfaSequence {
                file: basename(file.trim()).to_string(),
                ..XmfaSequence::default()
            });
        }
    }
}

fn parse_segment_header(header: &str, line: usize, one_based: bool) -> Result<PendingSegment, AlignmentError> {
    let header = header.trim_start();
    let (sequence, rest) = header
        .split_once(':')
        .ok_or_else(|| malformed(line, "segment header without ':'"))?;
    let sequence: usize = sequence
        .trim()
        .parse()
        .ok()
        .filter(|&sequence| sequence > 0)
        .ok_or_else(|| malformed(line, format!("invalid sequence number \"{sequence}\"")))?;

    let mut fields = rest.split_whitespace();
    let range = fields.next().unwrap_or_default();
    let strand = fields.next().unwrap_or("+");
    let (start, end) = range
        .split_once('-')
        .and_then(|(start, end)| Some((start.parse::<u64>().ok()?, end.parse::<u64>().ok()?)))
        .ok_or_else(|| malformed(line, format!("invalid range \"{range}\"")))?;

    let (start, length) = if start == 0 && end == 0 {
        (0, 0)
    } else if one_based {
        let start = start
            .checked_sub(1)
            .ok_or_else(|| malformed(line, "1-based range starts at 0"))?;
        (start, end.saturating_sub(start))
    } else {
        (start, end.saturating_sub(start))
    };

    Ok(PendingSegment {
        sequence: sequence - 1,
        start,
        length,
        reverse: strand == "-",
        aligned: Vec::new(),
    })
}

fn close_block(segments: Vec<PendingSegment>, line: usize, sequences: &mut Vec<XmfaSequence>) -> AlignmentBlock {
    let segments = segments
        .into_iter()
        .filter(|segment| segment.length > 0)
        .map(|segment| {
            if sequences.len() <= segment.sequence {
                // sequences without a header entry are named by number
                for number in sequences.len()..=segment.sequence {
                    sequences.push(XmfaSequence {
                        file: (number + 1).to_string(),
                        ..XmfaSequence::default()
                    });
                }
            }
            let span = if segment.reverse {
                Span::Reverse {
                    start: segment.start,
                    length: segment.length,
                }
            } else {
                Span::Forward {
                    start: segment.start,
                    length: segment.length,
                }
            };
            AlignedSegment {
                track: sequences[segment.sequence].file.clone(),
                contig: None,
                span,
                contig_length: 0,
                aligned: segment.aligned,
            }
        })
        .collect();

    AlignmentBlock {
        core: false,
        line,
        segments,
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> AlignmentError {
    AlignmentError::MalformedBlock {
        line,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XMFA: &str = "\
#FormatVersion Mauve1
#Sequence1File\t/data/ref.fna
##SequenceHeader >chr1 reference
##SequenceLength 12bp
#Sequence2File\tquery.fna
##SequenceLength 10bp
> 1:1-6 + ref.fna
ACGT
AC
> 2:3-7 - query.fna
ACG-TA
=
> 1:8-10 + ref.fna
GGG
> 2:0-0 + query.fna
=
";

    #[test]
    fn reads_header_metadata() {
        let alignment = read(XMFA.as_bytes()).unwrap();
        assert_eq!(
            alignment.sequences,
            vec![
                XmfaSequence {
                    file: "ref.fna".to_string(),
                    header: Some("chr1 reference".to_string()),
                    length: Some(12),
                },
                XmfaSequence {
                    file: "query.fna".to_string(),
                    header: None,
                    length: Some(10),
                },
            ]
        );
    }

    #[test]
    fn converts_one_based_ranges_and_marks_core() {
        let alignment = read(XMFA.as_bytes()).unwrap();
        assert_eq!(alignment.blocks.len(), 2);

        let first = &alignment.blocks[0];
        assert!(first.core);
        assert_eq!(first.line, 7);
        assert_eq!(first.segments[0].span, Span::Forward { start: 0, length: 6 });
        assert_eq!(first.segments[0].aligned, b"ACGTAC".to_vec());
        assert_eq!(first.segments[1].track, "query.fna");
        assert_eq!(first.segments[1].span, Span::Reverse { start: 2, length: 5 });

        let second = &alignment.blocks[1];
        assert!(!second.core);
        assert_eq!(second.segments.len(), 1);
    }

    #[test]
    fn zero_based_without_mauve_version() {
        let text = "> 1:4-8 + a\nACGT\n> 2:0-4 + b\nACGT\n=\n";
        let alignment = read(text.as_bytes()).unwrap();
        assert_eq!(alignment.sequences.len(), 2);
        assert_eq!(alignment.sequences[1].file, "2");
        assert!(alignment.blocks[0].core);
        assert_eq!(alignment.blocks[0].segments[0].span, Span::Forward { start: 4, length: 4 });
    }

    #[test]
    fn bad_segment_header_is_malformed() {
        assert!(matches!(
            read("> x:1-4 +\nACGT\n=\n".as_bytes()),
            Err(AlignmentError::MalformedBlock { line: 1, .. })
        ));
        assert!(matches!(
            read("ACGT\n".as_bytes()),
            Err(AlignmentError::MalformedBlock { line: 1, .. })
        ));
    }
}
