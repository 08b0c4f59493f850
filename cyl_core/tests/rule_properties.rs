//! Property-based tests for active sets and rule-book generation.

use std::collections::HashSet;
use std::sync::Arc;

use cyl_core::prelude::*;
use cyl_core::strided_input;
use proptest::prelude::*;

#[path = "../benches/scan/mod.rs"]
mod scan;

const SHAPE: [usize; 3] = [12, 10, 6];

/// Unique voxels in a small two-slot grid, in generation order.
fn voxel_set() -> impl Strategy<Value = Arc<ActiveSet>> {
    prop::collection::vec(
        (0..2i32, 0..SHAPE[0] as i32, 0..SHAPE[1] as i32, 0..SHAPE[2] as i32),
        1..80,
    )
    .prop_map(|raw| {
        let mut seen = HashSet::new();
        let coords = raw
            .into_iter()
            .map(|(b, z, y, x)| VoxelCoord::new(b, z, y, x))
            .filter(|c| seen.insert(*c))
            .collect::<Vec<_>>();
        Arc::new(ActiveSet::new(coords, SpatialShape::new(SHAPE), 2).unwrap())
    })
}

fn odd_kernel() -> impl Strategy<Value = [usize; 3]> {
    prop::array::uniform3(prop::sample::select(vec![1usize, 3]))
}

fn pool_geometry() -> impl Strategy<Value = ConvGeometry> {
    (
        prop::array::uniform3(prop::sample::select(vec![2usize, 3])),
        prop::array::uniform3(1usize..=2),
        prop::array::uniform3(0usize..=1),
    )
        .prop_map(|(kernel, stride, padding)| {
            ConvGeometry::new(kernel)
                .with_stride(stride)
                .with_padding(padding)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Submanifold output rows are the input rows, and the centre tap is the identity
    #[test]
    fn submanifold_keeps_active_set(set in voxel_set(), kernel in odd_kernel()) {
        let g = ConvGeometry::new(kernel);
        let book = build_submanifold(&set, &g).unwrap();

        prop_assert_eq!(book.num_inputs(), set.len());
        prop_assert_eq!(book.num_outputs(), set.len());

        let centre = &book.taps()[g.center_index()];
        let expected: Vec<(u32, u32)> = (0..set.len() as u32).map(|r| (r, r)).collect();
        prop_assert_eq!(centre.pairs().collect::<Vec<_>>(), expected);
    }

    /// Each (output row, tap) receives at most one input row
    #[test]
    fn submanifold_pairs_are_unique_per_tap(set in voxel_set(), kernel in odd_kernel()) {
        let book = build_submanifold(&set, &ConvGeometry::new(kernel)).unwrap();
        for rules in book.taps() {
            let mut outputs = rules.output().to_vec();
            outputs.sort_unstable();
            outputs.dedup();
            prop_assert_eq!(outputs.len(), rules.len());
        }
    }

    /// A neighbour relation through tap k appears reversed through the mirrored tap
    #[test]
    fn submanifold_is_symmetric(set in voxel_set(), kernel in odd_kernel()) {
        let g = ConvGeometry::new(kernel);
        let book = build_submanifold(&set, &g).unwrap();
        let last = g.volume() - 1;
        for (k, rules) in book.taps().iter().enumerate() {
            let mirrored: HashSet<(u32, u32)> = book.taps()[last - k].pairs().collect();
            for (i, o) in rules.pairs() {
                prop_assert!(mirrored.contains(&(o, i)));
            }
        }
    }

    /// Submanifold neighbours never cross batch slots
    #[test]
    fn submanifold_respects_batches(set in voxel_set()) {
        let book = build_submanifold(&set, &ConvGeometry::new([3, 3, 3])).unwrap();
        for rules in book.taps() {
            for (i, o) in rules.pairs() {
                prop_assert_eq!(
                    set.coords()[i as usize].batch,
                    set.coords()[o as usize].batch
                );
            }
        }
    }

    /// Every strided pair satisfies the convolution index equation
    #[test]
    fn strided_pairs_satisfy_geometry(set in voxel_set(), g in pool_geometry()) {
        let (out, book) = build_strided(&set, &g).unwrap();
        prop_assert_eq!(book.num_outputs(), out.len());

        for (k, rules) in book.taps().iter().enumerate() {
            for (i, o) in rules.pairs() {
                let q = set.coords()[i as usize];
                let p = out.coords()[o as usize];
                prop_assert_eq!(q.batch, p.batch);
                prop_assert_eq!(strided_input(p.spatial(), g.tap(k), &g), q.spatial());
            }
        }
    }

    /// Strided outputs are unique, in bounds, and each has at least one contributor
    #[test]
    fn strided_output_set_is_well_formed(set in voxel_set(), g in pool_geometry()) {
        let (out, book) = build_strided(&set, &g).unwrap();
        let shape = out.spatial_shape();

        let unique: HashSet<VoxelCoord> = out.coords().iter().copied().collect();
        prop_assert_eq!(unique.len(), out.len());
        for c in out.coords() {
            prop_assert!(shape.contains(c.spatial()));
        }

        let mut fed = vec![false; out.len()];
        for rules in book.taps() {
            for &o in rules.output() {
                fed[o as usize] = true;
            }
        }
        prop_assert!(fed.into_iter().all(|f| f));
    }

    /// Strided output is a pure function of the input and geometry
    #[test]
    fn strided_is_deterministic(set in voxel_set(), g in pool_geometry()) {
        let (a, book_a) = build_strided(&set, &g).unwrap();
        let (b, book_b) = build_strided(&set, &g).unwrap();
        prop_assert_eq!(a.coords(), b.coords());
        prop_assert_eq!(book_a, book_b);
    }

    /// The inverse of a recorded stage restores the pre-stride set
    #[test]
    fn inverse_restores_recorded_set(set in voxel_set(), g in pool_geometry()) {
        let mut cache = RuleCache::new();
        let down = cache.strided(&set, &g).unwrap();
        let up = cache.inverse(down.key, &down.output).unwrap();

        prop_assert_eq!(up.output.id(), set.id());
        prop_assert_eq!(up.rules.num_inputs(), down.output.len());
        prop_assert_eq!(up.rules.num_outputs(), set.len());
        prop_assert_eq!(up.rules.num_pairs(), down.rules.num_pairs());
    }
}

#[test]
fn test_empty_set_builds_empty_rules() {
    let set = Arc::new(ActiveSet::new(Vec::new(), SpatialShape::new(SHAPE), 1).unwrap());
    let mut cache = RuleCache::new();

    let subm = cache.submanifold(&set, &ConvGeometry::new([3, 3, 3])).unwrap();
    assert_eq!(subm.num_pairs(), 0);

    let pool = ConvGeometry::new([3, 3, 3])
        .with_stride([2, 2, 2])
        .with_padding([1, 1, 1]);
    let down = cache.strided(&set, &pool).unwrap();
    assert!(down.output.is_empty());
    assert_eq!(down.output.spatial_shape().dims(), [6, 5, 3]);

    let up = cache.inverse(down.key, &down.output).unwrap();
    assert!(up.output.is_empty());
}

#[test]
fn test_key_display_names_scope() {
    let set = Arc::new(
        ActiveSet::new(vec![VoxelCoord::new(0, 1, 1, 1)], SpatialShape::new(SHAPE), 1).unwrap(),
    );
    let mut cache = RuleCache::new();
    let pool = ConvGeometry::new([3, 3, 3])
        .with_stride([2, 2, 2])
        .with_padding([1, 1, 1]);
    let down = cache.strided(&set, &pool).unwrap();

    assert_eq!(down.key.to_string(), format!("down0@pass{}", cache.scope()));
    let err = RuleCache::new().inverse(down.key, &down.output).unwrap_err();
    assert!(err.to_string().contains("down0@pass"));
}

#[test]
fn test_benchmark_sweep_is_distinct_at_full_size() {
    let coords = scan::cylinder_sweep(100_000);
    assert_eq!(coords.len(), 100_000);

    let set = ActiveSet::new(coords, SpatialShape::new(scan::SHAPE), 1).unwrap();
    assert_eq!(set.len(), 100_000);

    let full = scan::cylinder_sweep(scan::CAPACITY);
    assert_eq!(full.iter().collect::<HashSet<_>>().len(), scan::CAPACITY);
}
