//! Column scan deriving variants from one aligned block.

use super::{
    Variant, VariantError, VariantList, FILTER_ALIGNMENT, FILTER_CONSERVATION, FILTER_INDEL,
    FILTER_LCB, FILTER_N,
};
use crate::genomics::{reverse_complement_in_place, GAP, UNKNOWN};

/// A centred window and the threshold it is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowThreshold {
    /// Columns in the window, centred on the variant column.
    pub window: usize,
    /// Minimum identity or maximum gap density, as a fraction.
    pub threshold: f64,
}

/// Optional windowed filters applied during the column scan.
///
/// All windows are disabled by default, so only the `IND` and `N` bits
/// are set unless a window is configured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerConfig {
    /// Flag variants within this many columns of either block edge.
    pub lcb_window: Option<usize>,
    /// Flag variants whose window identity falls below the threshold.
    pub conservation: Option<WindowThreshold>,
    /// Flag variants whose window gap density exceeds the threshold.
    pub gap_density: Option<WindowThreshold>,
}

impl CallerConfig {
    /// Enable the LCB-boundary filter.
    pub fn with_lcb_window(mut self, columns: usize) -> Self {
        self.lcb_window = Some(columns.max(1));
        self
    }

    /// Enable the low-conservation filter.
    pub fn with_conservation(mut self, window: usize, min_identity: f64) -> Result<Self, VariantError> {
        self.conservation = Some(validated(window, min_identity)?);
        Ok(self)
    }

    /// Enable the gap-density filter.
    pub fn with_gap_density(mut self, window: usize, max_density: f64) -> Result<Self, VariantError> {
        self.gap_density = Some(validated(window, max_density)?);
        Ok(self)
    }
}

fn validated(window: usize, threshold: f64) -> Result<WindowThreshold, VariantError> {
    if window == 0 {
        return Err(VariantError::InvalidConfig("window must be > 0".to_string()));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(VariantError::InvalidConfig(format!(
            "threshold {threshold} is not a fraction"
        )));
    }
    Ok(WindowThreshold { window, threshold })
}

/// Prefix counts of agreeing and gapped columns for O(1) window queries.
struct ColumnProfile {
    agreeing: Vec<u32>,
    gapped: Vec<u32>,
}

impl ColumnProfile {
    fn new(rows: &[Vec<u8>], width: usize) -> Self {
        let mut agreeing = Vec::with_capacity(width + 1);
        let mut gapped = Vec::with_capacity(width + 1);
        agreeing.push(0);
        gapped.push(0);
        for column in 0..width {
            let first = rows[0][column];
            let agree = rows.iter().all(|row| row[column] == first);
            let gap = rows.iter().any(|row| row[column] == GAP);
            agreeing.push(agreeing[column] + u32::from(agree));
            gapped.push(gapped[column] + u32::from(gap));
        }
        Self { agreeing, gapped }
    }

    fn window(&self, column: usize, window: usize) -> (usize, usize) {
        let width = self.agreeing.len() - 1;
        let half = window / 2;
        (column.saturating_sub(half), (column + half + 1).min(width))
    }

    fn identity(&self, column: usize, window: usize) -> f64 {
        let (low, high) = self.window(column, window);
        f64::from(self.agreeing[high] - self.agreeing[low]) / (high - low) as f64
    }

    fn gap_density(&self, column: usize, window: usize) -> f64 {
        let (low, high) = self.window(column, window);
        f64::from(self.gapped[high] - self.gapped[low]) / (high - low) as f64
    }
}

impl VariantList {
    /// Scan the columns of one block and append a variant for every column
    /// in which some track differs from the reference row (`rows[0]`).
    ///
    /// Rows are upper-cased, and reverse-complemented when `reverse`, so
    /// alleles are always reported on the forward reference strand.
    /// `position` is the reference position of the block's first base.
    /// Returns the number of variants added.
    pub fn add_variants_from_alignment(
        &mut self,
        rows: &[Vec<u8>],
        sequence: usize,
        position: u64,
        reverse: bool,
        config: &CallerConfig,
    ) -> Result<usize, VariantError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let width = first.len();
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(VariantError::RaggedAlignment {
                expected: width,
                found: row.len(),
            });
        }

        let rows: Vec<Vec<u8>> = rows
            .iter()
            .map(|row| {
                let mut row = row.to_ascii_uppercase();
                if reverse {
                    reverse_complement_in_place(&mut row);
                }
                row
            })
            .collect();
        let reference = &rows[0];
        let profile = ColumnProfile::new(&rows, width);
        let leading = reference.iter().take_while(|&&base| base == GAP).count();

        let before = self.len();
        let mut bases = 0u64;
        let mut offset = 0i32;

        for column in 0..width {
            let reference_base = reference[column];
            let (anchor, column_offset) = if reference_base != GAP {
                bases += 1;
                offset = 0;
                (position + bases - 1, 0)
            } else if bases == 0 {
                (position, -((leading - column) as i32))
            } else {
                offset += 1;
                (position + bases - 1, offset)
            };

            // all-gap columns stay so the aligned rows can be rebuilt
            if reference_base != GAP && rows.iter().all(|row| row[column] == reference_base) {
                continue;
            }

            let alleles: Vec<u8> = rows.iter().map(|row| row[column]).collect();
            let mut filters = 0;
            if reference_base == GAP || alleles.contains(&GAP) {
                filters |= FILTER_INDEL;
            }
            if reference_base == UNKNOWN || alleles.contains(&UNKNOWN) {
                filters |= FILTER_N;
            }
            if let Some(edge) = config.lcb_window {
                if column < edge || column + edge >= width {
                    filters |= FILTER_LCB;
                }
            }
            if let Some(conservation) = config.conservation {
                if profile.identity(column, conservation.window) < conservation.threshold {
                    filters |= FILTER_CONSERVATION;
                }
            }
            if let Some(gaps) = config.gap_density {
                if profile.gap_density(column, gaps.window) > gaps.threshold {
                    filters |= FILTER_ALIGNMENT;
                }
            }

            self.push(Variant {
                sequence,
                position: anchor,
                offset: column_offset,
                reference: reference_base,
                alleles,
                filters,
                quality: 0,
            });
        }

        Ok(self.len() - before)
    }
}
