use std::io::{self, BufRead, Write};

use bio::io::fasta;
use thiserror::Error;

/// Errors raised while resolving reference sequences.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// A sequence name could not be matched against the loaded reference.
    #[error("sequence \"{0}\" not found in reference")]
    NameNotFound(String),

    /// No loaded reference carries the requested accession.
    #[error("could not find a loaded reference with accession \"{0}\"")]
    AccessionNotFound(String),
}

/// A named, ungapped reference sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reference {
    /// Sequence name (FASTA tag up to the first space).
    pub name: String,
    /// Free-text description (remainder of the FASTA tag).
    pub description: String,
    /// Ungapped nucleotide sequence as ASCII.
    pub sequence: Vec<u8>,
}

impl Reference {
    /// Construct a reference from its parts.
    pub fn new(name: impl Into<String>, description: impl Into<String>, sequence: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sequence,
        }
    }

    /// Sequence length in bases.
    pub fn len(&self) -> u64 {
        self.sequence.len() as u64
    }

    /// Returns `true` if the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// FASTA tag (`name` plus description when present).
    pub fn tag(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.description)
        }
    }
}

/// Ordered reference sequences defining the concatenated coordinate space.
///
/// Sequence ids are indices into the list; their order is fixed once loaded
/// so `concatenated_position(seq, pos) = pos + Σ len(seq' < seq)` is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceList {
    references: Vec<Reference>,
}

impl ReferenceList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all references.
    pub fn clear(&mut self) {
        self.references.clear();
    }

    /// Append a reference and return its sequence id.
    pub fn add_reference(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        sequence: Vec<u8>,
    ) -> usize {
        self.push(Reference::new(name, description, sequence))
    }

    /// Append an already constructed reference and return its sequence id.
    pub fn push(&mut self, reference: Reference) -> usize {
        self.references.push(reference);
        self.references.len() - 1
    }

    /// Number of reference sequences.
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Returns `true` when no reference is loaded.
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Reference by sequence id.
    pub fn get(&self, sequence: usize) -> Option<&Reference> {
        self.references.get(sequence)
    }

    /// Mutable reference by sequence id.
    pub fn get_mut(&mut self, sequence: usize) -> Option<&mut Reference> {
        self.references.get_mut(sequence)
    }

    /// Iterate references in sequence-id order.
    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter()
    }

    /// Total length of the concatenated coordinate space.
    pub fn total_len(&self) -> u64 {
        self.references.iter().map(Reference::len).sum()
    }

    /// Sequence id of the reference named exactly `name`.
    pub fn index_of(&self, name: &str) -> Result<usize, ReferenceError> {
        self.references
            .iter()
            .position(|reference| reference.name == name)
            .ok_or_else(|| ReferenceError::NameNotFound(name.to_string()))
    }

    /// Sequence id of the first reference whose name contains `accession`.
    pub fn index_of_accession(&self, accession: &str) -> Result<usize, ReferenceError> {
        self.references
            .iter()
            .position(|reference| reference.name.contains(accession))
            .ok_or_else(|| ReferenceError::AccessionNotFound(accession.to_string()))
    }

    /// Translate `(sequence, position)` into the concatenated coordinate space.
    pub fn concatenated_position(&self, sequence: usize, position: u64) -> u64 {
        position
            + self
                .references
                .iter()
                .take(sequence)
                .map(Reference::len)
                .sum::<u64>()
    }

    /// Sequence id containing a concatenated coordinate, if any.
    pub fn sequence_from_concatenated(&self, position: u64) -> Option<usize> {
        let mut end = 0;
        for (index, reference) in self.references.iter().enumerate() {
            end += reference.len();
            if end > position {
                return Some(index);
            }
        }
        None
    }

    /// Position within `sequence` of a concatenated coordinate.
    pub fn position_from_concatenated(&self, sequence: usize, position: u64) -> u64 {
        position - self.concatenated_position(sequence, 0)
    }

    /// Load references from FASTA text, appending to the list.
    ///
    /// Sequence lines appearing before the first header are an error.
    pub fn read_fasta<R: BufRead>(&mut self, reader: R) -> io::Result<usize> {
        let first_new = self.references.len();
        for record in fasta::Reader::new(reader).records() {
            let record = record?;
            self.references.push(Reference::new(
                record.id(),
                record.desc().unwrap_or_default(),
                record.seq().to_vec(),
            ));
        }
        Ok(self.references.len() - first_new)
    }

    /// Write all references as FASTA with `width` bases per line.
    pub fn write_fasta<W: Write>(&self, out: &mut W, width: usize) -> io::Result<()> {
        let width = width.max(1);
        for reference in &self.references {
            writeln!(out, ">{}", reference.tag())?;
            for chunk in reference.sequence.chunks(width) {
                out.write_all(chunk)?;
                out.write_all(b"\n")?;
            }
        }
        out.flush()
    }
}
