//! BED intervals used as variant filters.

use std::io::BufRead;

use super::VariantError;
use crate::genomics::ReferenceList;

/// Half-open `[start, end)` interval on a reference sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BedInterval {
    /// Reference sequence id.
    pub sequence: usize,
    /// 0-based start.
    pub start: u64,
    /// Exclusive end.
    pub end: u64,
}

/// Read `chrom start end` rows, resolving `chrom` against `references`.
///
/// Blank lines and `#`, `track` and `browser` lines are skipped; columns
/// after the third are ignored.
pub fn read_bed<R: BufRead>(
    reader: R,
    references: &ReferenceList,
) -> Result<Vec<BedInterval>, VariantError> {
    let mut intervals = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty()
            || line.starts_with('#')
            || line.starts_with("track")
            || line.starts_with("browser")
        {
            continue;
        }

        let number = index + 1;
        let mut fields = line.split_whitespace();
        let (Some(chrom), Some(start), Some(end)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(VariantError::MalformedRecord {
                line: number,
                reason: "expected chrom, start and end columns".to_string(),
            });
        };
        let (Ok(start), Ok(end)) = (start.trim().parse::<u64>(), end.trim().parse::<u64>()) else {
            return Err(VariantError::MalformedRecord {
                line: number,
                reason: "start and end must be unsigned integers".to_string(),
            });
        };
        if end < start {
            return Err(VariantError::MalformedRecord {
                line: number,
                reason: format!("end {end} precedes start {start}"),
            });
        }

        intervals.push(BedInterval {
            sequence: references.index_of(chrom.trim())?,
            start,
            end,
        });
    }

    Ok(intervals)
}

/// Sort and coalesce overlapping or touching intervals.
pub(crate) fn merge(intervals: &[BedInterval]) -> Vec<BedInterval> {
    let mut sorted = intervals.to_vec();
    sorted.sort_unstable();
    let mut merged: Vec<BedInterval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if last.sequence == interval.sequence && interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Membership test against the output of [`merge`].
pub(crate) fn contains(merged: &[BedInterval], sequence: usize, position: u64) -> bool {
    let index = merged.partition_point(|interval| (interval.sequence, interval.start) <= (sequence, position));
    index > 0 && {
        let candidate = &merged[index - 1];
        candidate.sequence == sequence && position < candidate.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn references() -> ReferenceList {
        let mut references = ReferenceList::new();
        references.add_reference("chr1", "", vec![b'A'; 100]);
        references.add_reference("chr2", "", vec![b'A'; 100]);
        references
    }

    #[test]
    fn reads_rows_and_skips_headers() {
        let text = "track name=mask\n# comment\nchr2\t10\t20\tname\n\nchr1\t0\t5\n";
        let intervals = read_bed(text.as_bytes(), &references()).unwrap();
        assert_eq!(
            intervals,
            vec![
                BedInterval { sequence: 1, start: 10, end: 20 },
                BedInterval { sequence: 0, start: 0, end: 5 },
            ]
        );
    }

    #[test]
    fn unknown_chromosome_and_bad_rows_fail() {
        assert!(matches!(
            read_bed("chrX\t1\t2\n".as_bytes(), &references()),
            Err(VariantError::Reference(_))
        ));
        assert!(matches!(
            read_bed("chr1\tten\t20\n".as_bytes(), &references()),
            Err(VariantError::MalformedRecord { line: 1, .. })
        ));
        assert!(matches!(
            read_bed("chr1\t30\t20\n".as_bytes(), &references()),
            Err(VariantError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn merged_membership_is_half_open() {
        let merged = merge(&[
            BedInterval { sequence: 0, start: 10, end: 20 },
            BedInterval { sequence: 0, start: 15, end: 30 },
            BedInterval { sequence: 1, start: 0, end: 1 },
        ]);
        assert_eq!(merged.len(), 2);
        assert!(contains(&merged, 0, 10));
        assert!(contains(&merged, 0, 29));
        assert!(!contains(&merged, 0, 30));
        assert!(!contains(&merged, 0, 9));
        assert!(contains(&merged, 1, 0));
        assert!(!contains(&merged, 1, 1));
        assert!(!contains(&merged, 2, 0));
    }
}
