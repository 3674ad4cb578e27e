//! MAF (multiple alignment format) scanner.
//!
//! Blocks start with an `a` line and hold one `s` line per aligned row:
//!
//! ```text
//! a score=12
//! s genomeA.chr1  10 4 + 100 AC-GT
//! s genomeB.ctg7   0 4 - 50  ACTG-
//! ```
//!
//! The source field is `track.contig`. A block is core when it holds as
//! many rows as the widest block in the file.

use std::io::{BufRead, Seek};

use tracing::debug;

use super::{AlignedSegment, AlignmentBlock, AlignmentError, Span};
use crate::util::parse_u64;

/// Core blocks of a MAF file.
///
/// Construction counts the rows of every block; iteration rewinds and
/// parses only blocks as wide as the widest, so non-core rows are never
/// held in memory.
#[derive(Debug)]
pub struct CoreBlocks<R> {
    reader: R,
    rows: Vec<usize>,
    widest: usize,
    block: usize,
    number: usize,
    line: String,
    current: Option<AlignmentBlock>,
    done: bool,
}

impl<R: BufRead + Seek> CoreBlocks<R> {
    /// Count rows per block, then rewind `reader` for the parsing pass.
    pub fn new(mut reader: R) -> Result<Self, AlignmentError> {
        let mut rows: Vec<usize> = Vec::new();
        let mut open = false;
        let mut line = String::new();
        let mut number = 0;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            number += 1;
            match line.as_bytes().first() {
                Some(b'a') => {
                    rows.push(0);
                    open = true;
                }
                Some(b's') => match rows.last_mut() {
                    Some(count) if open => *count += 1,
                    _ => return Err(malformed(number, "sequence line outside an alignment block")),
                },
                Some(b'#') => {}
                Some(_) if line.trim().is_empty() => open = false,
                // i, e and q lines carry nothing the backbone uses
                Some(_) => {}
                None => open = false,
            }
        }
        reader.rewind()?;

        let widest = rows.iter().copied().max().unwrap_or(0);
        debug!(
            blocks = rows.len(),
            core = rows.iter().filter(|&&count| widest > 0 && count == widest).count(),
            rows = widest,
            "counted MAF blocks"
        );
        Ok(Self {
            reader,
            rows,
            widest,
            block: 0,
            number: 0,
            line: String::new(),
            current: None,
            done: false,
        })
    }

    /// Row count of the widest block.
    pub fn widest(&self) -> usize {
        self.widest
    }

    /// Number of blocks in the file.
    pub fn block_count(&self) -> usize {
        self.rows.len()
    }

    fn next_block(&mut self) -> Result<Option<AlignmentBlock>, AlignmentError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(self.current.take());
            }
            self.number += 1;
            let line = self.line.trim_end_matches(['\n', '\r']);

            match line.as_bytes().first() {
                Some(b'a') => {
                    let core = self.rows.get(self.block).copied() == Some(self.widest) && self.widest > 0;
                    self.block += 1;
                    let ready = self.current.take();
                    if core {
                        self.current = Some(AlignmentBlock {
                            core: true,
                            line: self.number,
                            segments: Vec::with_capacity(self.widest),
                        });
                    }
                    if ready.is_some() {
                        return Ok(ready);
                    }
                }
                Some(b's') => {
                    if let Some(block) = self.current.as_mut() {
                        block.segments.push(parse_sequence_line(line, self.number)?);
                    }
                }
                Some(_) if !line.trim().is_empty() => {}
                _ => {
                    if let Some(block) = self.current.take() {
                        return Ok(Some(block));
                    }
                }
            }
        }
    }
}

impl<R: BufRead + Seek> Iterator for CoreBlocks<R> {
    type Item = Result<AlignmentBlock, AlignmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_block() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

fn parse_sequence_line(line: &str, number: usize) -> Result<AlignedSegment, AlignmentError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [_, source, start, size, strand, source_size, text] = fields.as_slice() else {
        return Err(malformed(number, format!("expected 7 fields, found {}", fields.len())));
    };

    let (track, contig) = match source.split_once('.') {
        Some((track, contig)) => (track.to_string(), Some(contig.to_string())),
        None => (source.to_string(), None),
    };
    let number_field = |text: &str, what: &str| {
        parse_u64(text).ok_or_else(|| malformed(number, format!("invalid {what} \"{text}\"")))
    };
    let start = number_field(start, "start")?;
    let length = number_field(size, "size")?;
    let contig_length = number_field(source_size, "source size")?;

    let span = match *strand {
        "+" => Span::Forward { start, length },
        "-" => Span::ReverseRelative { start, length },
        other => return Err(malformed(number, format!("invalid strand \"{other}\""))),
    };

    Ok(AlignedSegment {
        track,
        contig,
        span,
        contig_length,
        aligned: text.as_bytes().to_vec(),
    })
}

fn malformed(line: usize, reason: impl Into<String>) -> AlignmentError {
    AlignmentError::MalformedBlock {
        line,
        reason: reason.into(),
    }
}
