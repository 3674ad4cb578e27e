//! Standard genetic code.

use super::sequence::reverse_complement;

/// Amino acids of the standard code in `TCAG` codon order
/// (first base slowest, third base fastest). Stops are `*`.
const STANDARD_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

fn tcag_index(base: u8) -> Option<usize> {
    match base.to_ascii_uppercase() {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

/// Translate a forward-strand codon. Returns `None` for codons with gaps,
/// ambiguity codes or the wrong length.
pub fn translate(codon: &[u8]) -> Option<u8> {
    if codon.len() != 3 {
        return None;
    }
    let index = tcag_index(codon[0])? * 16 + tcag_index(codon[1])? * 4 + tcag_index(codon[2])?;
    Some(STANDARD_CODE[index])
}

/// Translate a codon read on the reverse strand, given as it appears on the
/// forward strand (e.g. `TTT` reads as `AAA`, lysine).
pub fn translate_reverse(codon: &[u8]) -> Option<u8> {
    translate(&reverse_complement(codon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(b"ATG", b'M')]
    #[test_case(b"TTT", b'F')]
    #[test_case(b"TAA", b'*')]
    #[test_case(b"TGA", b'*')]
    #[test_case(b"TGG", b'W')]
    #[test_case(b"AGA", b'R')]
    #[test_case(b"ggc", b'G')]
    fn forward_codons(codon: &[u8], amino_acid: u8) {
        assert_eq!(translate(codon), Some(amino_acid));
    }

    #[test_case(b"TTT", b'K')]
    #[test_case(b"CAT", b'M')]
    #[test_case(b"TTA", b'*')]
    #[test_case(b"GCA", b'C')]
    #[test_case(b"CCA", b'W')]
    fn reverse_strand_codons(codon: &[u8], amino_acid: u8) {
        assert_eq!(translate_reverse(codon), Some(amino_acid));
    }

    #[test]
    fn invalid_codons_do_not_translate() {
        assert_eq!(translate(b"ANG"), None);
        assert_eq!(translate(b"A-G"), None);
        assert_eq!(translate(b"AT"), None);
    }
}
