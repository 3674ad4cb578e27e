use std::io::Cursor;

use proptest::prelude::*;

use harvest::{Harvest, HarvestConfig, NodeId, PhylogenyTree, Variant, VariantList};

fn bases(length: std::ops::Range<usize>) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T')], length)
}

fn gapped_bases(length: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(
        prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T'), Just(b'-')],
        length,
    )
}

/// Blocks as `(reference start, reference row, second row)`.
fn maf_blocks() -> impl Strategy<Value = Vec<(u64, Vec<u8>, Vec<u8>)>> {
    proptest::collection::vec(
        (0u64..40, bases(1..10)).prop_flat_map(|(start, row)| {
            let width = row.len();
            (Just(start), Just(row), bases(width..width + 1))
        }),
        1..8,
    )
}

fn render_maf(blocks: &[(u64, Vec<u8>, Vec<u8>)]) -> String {
    let mut text = String::from("##maf version=1\n");
    for (index, (start, reference, other)) in blocks.iter().enumerate() {
        text.push_str(&format!(
            "a\ns ref.chr {start} {len} + 60 {}\ns b.x {other_start} {len} + 200 {}\n\n",
            String::from_utf8_lossy(reference),
            String::from_utf8_lossy(other),
            len = reference.len(),
            other_start = index * 20,
        ));
    }
    text
}

/// Rows for an aligned multi-FASTA. Every row, the reference included,
/// may hold gaps but keeps at least one base.
fn mfa_rows() -> impl Strategy<Value = Vec<Vec<u8>>> {
    (1usize..30, 2usize..5).prop_flat_map(|(width, count)| {
        proptest::collection::vec(
            gapped_bases(width).prop_filter("row needs a base", |row| row.iter().any(|&base| base != b'-')),
            count,
        )
    })
}

fn unwrap_mfa(text: &str) -> Vec<Vec<u8>> {
    let mut rows: Vec<Vec<u8>> = Vec::new();
    for line in text.lines() {
        if line.starts_with('>') {
            rows.push(Vec::new());
        } else if let Some(row) = rows.last_mut() {
            row.extend(line.bytes());
        }
    }
    rows
}

/// Join leaves `0..leaves` pairwise in the order `picks` dictates.
fn random_tree(lengths: &[f64], picks: &[usize]) -> PhylogenyTree {
    let mut tree = PhylogenyTree::new();
    let mut lengths = lengths.iter().copied().cycle();
    let leaves = picks.len() + 1;
    let mut pool: Vec<NodeId> = (0..leaves)
        .map(|track| tree.add_leaf(track, lengths.next().unwrap_or(1.0)))
        .collect();
    for &pick in picks {
        let first = pool.remove(pick % pool.len());
        let second = pool.remove(pick.wrapping_mul(7) % pool.len());
        let joined = tree.add_internal(vec![first, second], lengths.next().unwrap_or(1.0), 0.0);
        pool.push(joined);
    }
    tree.set_root(pool[0]);
    tree
}

fn all_nodes(tree: &PhylogenyTree) -> Vec<NodeId> {
    let mut stack: Vec<NodeId> = tree.root().into_iter().collect();
    let mut nodes = Vec::new();
    while let Some(id) = stack.pop() {
        nodes.push(id);
        stack.extend(tree.node(id).children().iter().copied());
    }
    nodes
}

/// Pairwise path lengths indexed by track.
fn track_distances(tree: &PhylogenyTree) -> Vec<Vec<f64>> {
    let ids = tree.leaf_ids();
    let count = ids.len();
    let mut position = vec![0; count];
    for (leaf, &track) in ids.iter().enumerate() {
        position[track] = leaf;
    }
    (0..count)
        .map(|first| {
            (0..count)
                .map(|second| tree.leaf_distance(position[first], position[second]))
                .collect()
        })
        .collect()
}

fn assert_same_distances(before: &[Vec<f64>], after: &[Vec<f64>]) -> Result<(), TestCaseError> {
    for (row_before, row_after) in before.iter().zip(after) {
        for (&expected, &actual) in row_before.iter().zip(row_after) {
            prop_assert!((expected - actual).abs() < 1e-9, "distance {expected} became {actual}");
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn accepted_blocks_never_overlap_on_the_reference(blocks in maf_blocks()) {
        let mut harvest = Harvest::new(HarvestConfig::default());
        let accepted = harvest.load_maf(Cursor::new(render_maf(&blocks)), None).unwrap();
        prop_assert!(accepted >= 1);

        let mut spans: Vec<(u64, u64)> = harvest
            .lcbs()
            .iter()
            .map(|lcb| (lcb.position, lcb.position + lcb.length))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
        for variant in harvest.variants().iter() {
            prop_assert!(
                spans.iter().any(|&(start, end)| start <= variant.position && variant.position < end),
                "variant at {} lies outside every block",
                variant.position
            );
        }
    }

    #[test]
    fn sorting_is_stable_and_idempotent(
        keys in proptest::collection::vec((0usize..3, 0u64..20, -2i32..3), 0..40)
    ) {
        let mut list = VariantList::with_builtin_filters();
        for (tag, &(sequence, position, offset)) in keys.iter().enumerate() {
            list.push(Variant {
                sequence,
                position,
                offset,
                reference: b'A',
                alleles: vec![b'A', b'C'],
                filters: 0,
                quality: tag as u32,
            });
        }
        list.sort_variants();
        prop_assert!(list.is_sorted());
        for pair in list.as_slice().windows(2) {
            if pair[0].key() == pair[1].key() {
                prop_assert!(pair[0].quality < pair[1].quality, "equal keys were reordered");
            }
        }

        let once = list.clone();
        list.sort_variants();
        prop_assert_eq!(list, once);
    }

    #[test]
    fn mfa_rows_survive_a_load_and_write(rows in mfa_rows()) {
        let mut text = String::new();
        for (index, row) in rows.iter().enumerate() {
            text.push_str(&format!(">t{index}\n{}\n", String::from_utf8_lossy(row)));
        }

        let mut harvest = Harvest::new(HarvestConfig::default());
        harvest.load_mfa(text.as_bytes()).unwrap();
        let mut out = Vec::new();
        harvest.write_mfa(&mut out).unwrap();
        prop_assert_eq!(unwrap_mfa(&String::from_utf8_lossy(&out)), rows);
    }

    #[test]
    fn reroot_preserves_leaf_distances(
        lengths in proptest::collection::vec(0.0f64..5.0, 1..16),
        picks in proptest::collection::vec(0usize..64, 1..8),
        choice in 0usize..64,
        fraction in 0.0f64..=1.0,
        reorder in any::<bool>(),
    ) {
        let mut tree = random_tree(&lengths, &picks);
        let before = track_distances(&tree);

        let nodes = all_nodes(&tree);
        let node = nodes[choice % nodes.len()];
        let distance = tree.node(node).distance() * fraction;
        tree.reroot(node, distance, reorder);

        prop_assert_eq!(tree.leaf_ids().len(), picks.len() + 1);
        assert_same_distances(&before, &track_distances(&tree))?;
    }

    #[test]
    fn midpoint_reroot_preserves_leaf_distances(
        lengths in proptest::collection::vec(0.0f64..5.0, 1..16),
        picks in proptest::collection::vec(0usize..64, 1..8),
    ) {
        let mut tree = random_tree(&lengths, &picks);
        let before = track_distances(&tree);
        tree.midpoint_reroot();
        assert_same_distances(&before, &track_distances(&tree))?;
    }
}
