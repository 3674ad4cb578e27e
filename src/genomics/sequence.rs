//! Nucleotide helpers shared by the alignment, variant and annotation code.
//!
//! Aligned rows are plain ASCII byte strings. Gaps are written as `-` and
//! unknown bases as `N`; IUPAC ambiguity codes are complemented pairwise so
//! reverse-complementing a row twice restores it.

/// Alignment gap character.
pub const GAP: u8 = b'-';

/// Unknown / ambiguous base.
pub const UNKNOWN: u8 = b'N';

/// Complement a single (upper- or lower-case) IUPAC nucleotide.
///
/// Gaps and characters outside the IUPAC alphabet are returned unchanged.
#[inline]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' | b'u' => b'a',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        b'r' => b'y',
        b'y' => b'r',
        b'k' => b'm',
        b'm' => b'k',
        b'b' => b'v',
        b'v' => b'b',
        b'd' => b'h',
        b'h' => b'd',
        other => other,
    }
}

/// Reverse-complement `seq` in place.
pub fn reverse_complement_in_place(seq: &mut [u8]) {
    seq.reverse();
    for base in seq.iter_mut() {
        *base = complement(*base);
    }
}

/// Return the reverse complement of `seq`.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&base| complement(base)).collect()
}

/// Return `seq` with all gap characters removed.
pub fn ungap(seq: &[u8]) -> Vec<u8> {
    seq.iter().copied().filter(|&base| base != GAP).collect()
}

/// Number of non-gap characters in `seq`.
pub fn ungapped_len(seq: &[u8]) -> u64 {
    seq.iter().filter(|&&base| base != GAP).count() as u64
}

/// Final path component of `path` (the whole string when it has no `/`).
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// [`basename`] with everything from the first `.` removed.
pub fn basename_stem(path: &str) -> &str {
    let base = basename(path);
    base.split('.').next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(b"ACGT", b"ACGT" ; "palindrome")]
    #[test_case(b"AAC-G", b"C-GTT" ; "gap is kept in place")]
    #[test_case(b"acgN", b"Ncgt" ; "lowercase and unknown")]
    #[test_case(b"RYKM", b"KMRY" ; "ambiguity codes")]
    fn reverse_complements(input: &[u8], expected: &[u8]) {
        assert_eq!(reverse_complement(input), expected.to_vec());
        let mut owned = input.to_vec();
        reverse_complement_in_place(&mut owned);
        assert_eq!(owned, expected.to_vec());
    }

    #[test]
    fn double_reverse_complement_is_identity() {
        let seq = b"ACGTRYKMBVDHN-acgt".to_vec();
        assert_eq!(reverse_complement(&reverse_complement(&seq)), seq);
    }

    #[test]
    fn ungap_drops_gaps_only() {
        assert_eq!(ungap(b"A-C--GT-"), b"ACGT".to_vec());
        assert_eq!(ungapped_len(b"A-C--GT-"), 4);
        assert_eq!(ungapped_len(b"----"), 0);
    }

    #[test_case("genomes/b1.fna", "b1.fna", "b1")]
    #[test_case("ref.fasta.gz", "ref.fasta.gz", "ref")]
    #[test_case("plain", "plain", "plain")]
    fn basenames(path: &str, base: &str, stem: &str) {
        assert_eq!(basename(path), base);
        assert_eq!(basename_stem(path), stem);
    }
}
