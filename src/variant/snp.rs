use std::io::{self, Write};

use super::{VariantList, FILTER_INDEL};
use crate::genomics::TrackList;

impl VariantList {
    /// Write one FASTA record per track holding its allele at every variant
    /// that passes all filters.
    ///
    /// With `indels` the indel bit is tolerated and indel columns are kept;
    /// otherwise indel columns are skipped.
    pub fn write_snp_mfa<W: Write>(&self, out: &mut W, indels: bool, tracks: &TrackList) -> io::Result<()> {
        let allowed = if indels { FILTER_INDEL } else { 0 };
        let columns: Vec<_> = self
            .iter()
            .filter(|variant| variant.passes(allowed) && (indels || !variant.is_indel()))
            .collect();

        for (index, track) in tracks.iter().enumerate() {
            writeln!(out, ">{}", track.file)?;
            let row: Vec<u8> = columns
                .iter()
                .map(|variant| variant.alleles.get(index).copied().unwrap_or(b'-'))
                .collect();
            out.write_all(&row)?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}
