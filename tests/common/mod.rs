#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use harvest::{Harvest, HarvestConfig};

/// Three genomes over a 12-base reference: a SNP at 4, a deletion in `c`
/// at 8 and an ambiguous base in `b` at 9 (1-based).
pub const CORE_MAF: &str = "##maf version=1\n\
a score=0\n\
s ref.chr 0 12 + 12 ACGTACGTACGT\n\
s b.c1    0 12 + 12 ACGAACGTNCGT\n\
s c.c1    0 11 + 11 ACGTACG-ACGT\n\
\n";

/// Model loaded from [`CORE_MAF`].
pub fn core_harvest() -> Harvest {
    let mut harvest = Harvest::new(HarvestConfig::default());
    harvest
        .load_maf(Cursor::new(CORE_MAF), None)
        .expect("fixture alignment loads");
    harvest
}

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("HARVEST_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set HARVEST_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}
