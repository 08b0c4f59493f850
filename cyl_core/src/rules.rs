//! Rule-book generation for sparse convolutions.
//!
//! A rule book lists, for every kernel tap, the `(input row, output row)` pairs
//! whose features meet through that tap. Convolution then reduces to one
//! gather / matmul / scatter-add per tap; the dense volume is never built.

use rustc_hash::FxHashMap;

use crate::active_set::ActiveSet;
use crate::coords::{linear_index, strided_output, submanifold_neighbor};
use crate::error::Result;
use crate::types::{ConvGeometry, ConvMode, VoxelCoord};

/// Gather/scatter pairs for one kernel tap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapRules {
    input: Vec<u32>,
    output: Vec<u32>,
}

impl TapRules {
    /// Record that input row `input` contributes to output row `output`.
    #[inline]
    pub fn push(&mut self, input: u32, output: u32) {
        self.input.push(input);
        self.output.push(output);
    }

    /// Rows gathered from the input features.
    #[inline]
    pub fn input(&self) -> &[u32] {
        &self.input
    }

    /// Rows scattered into the output features.
    #[inline]
    pub fn output(&self) -> &[u32] {
        &self.output
    }

    /// Number of pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.input.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Iterate over `(input, output)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.input.iter().copied().zip(self.output.iter().copied())
    }

    fn swapped(&self) -> Self {
        Self {
            input: self.output.clone(),
            output: self.input.clone(),
        }
    }
}

/// Complete gather/scatter mapping of one sparse convolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBook {
    mode: ConvMode,
    geometry: ConvGeometry,
    num_inputs: usize,
    num_outputs: usize,
    taps: Vec<TapRules>,
}

impl RuleBook {
    /// Convolution mode this rule book drives.
    #[inline]
    pub fn mode(&self) -> ConvMode {
        self.mode
    }

    /// Kernel geometry the rules were generated for.
    #[inline]
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    /// Number of input rows.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Number of output rows.
    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Rules per kernel tap, indexed by flat tap index.
    #[inline]
    pub fn taps(&self) -> &[TapRules] {
        &self.taps
    }

    /// Total number of pairs across all taps.
    pub fn num_pairs(&self) -> usize {
        self.taps.iter().map(TapRules::len).sum()
    }

    /// Rule book of the transposed convolution: same taps, gather and scatter swapped.
    pub fn inverted(&self) -> RuleBook {
        RuleBook {
            mode: ConvMode::Inverse,
            geometry: self.geometry,
            num_inputs: self.num_outputs,
            num_outputs: self.num_inputs,
            taps: self.taps.iter().map(TapRules::swapped).collect(),
        }
    }
}

/// Build the rule book of a submanifold convolution over `set`.
///
/// The output rows are the input rows. For each voxel `p` and tap `k`, the pair
/// `(row(p + offset(k)), row(p))` is recorded when the neighbour is active.
pub fn build_submanifold(set: &ActiveSet, geometry: &ConvGeometry) -> Result<RuleBook> {
    geometry.validate_submanifold()?;

    let build_tap = |k: usize| -> TapRules {
        let tap = geometry.tap(k);
        let mut rules = TapRules::default();
        for (row, coord) in set.coords().iter().enumerate() {
            let neighbor = submanifold_neighbor(coord.spatial(), tap, geometry);
            if let Some(src) = set.row_of(VoxelCoord::from_spatial(coord.batch, neighbor)) {
                rules.push(src as u32, row as u32);
            }
        }
        rules
    };

    #[cfg(feature = "rayon")]
    let taps: Vec<TapRules> = {
        use rayon::prelude::*;
        (0..geometry.volume()).into_par_iter().map(build_tap).collect()
    };
    #[cfg(not(feature = "rayon"))]
    let taps: Vec<TapRules> = (0..geometry.volume()).map(build_tap).collect();

    let book = RuleBook {
        mode: ConvMode::Submanifold,
        geometry: *geometry,
        num_inputs: set.len(),
        num_outputs: set.len(),
        taps,
    };
    log::debug!(
        "submanifold rules: kernel={:?} voxels={} pairs={}",
        geometry.kernel,
        set.len(),
        book.num_pairs()
    );
    Ok(book)
}

/// Build the output set and rule book of a strided convolution over `set`.
///
/// Inputs are visited in row order and taps in flat order; each new output voxel
/// takes the next row. The result is therefore a pure function of the input
/// order and the geometry.
pub fn build_strided(set: &ActiveSet, geometry: &ConvGeometry) -> Result<(ActiveSet, RuleBook)> {
    geometry.validate()?;

    let out_shape = set.spatial_shape().downsampled(geometry);
    let volume = geometry.volume();

    let mut taps = vec![TapRules::default(); volume];
    let mut out_coords: Vec<VoxelCoord> = Vec::new();
    let mut out_rows: FxHashMap<u64, u32> = FxHashMap::default();

    for (row, coord) in set.coords().iter().enumerate() {
        for (k, rules) in taps.iter_mut().enumerate() {
            let Some(out) = strided_output(coord.spatial(), geometry.tap(k), geometry, out_shape)
            else {
                continue;
            };
            let out_coord = VoxelCoord::from_spatial(coord.batch, out);
            let out_row = *out_rows
                .entry(linear_index(out_coord, out_shape))
                .or_insert_with(|| {
                    out_coords.push(out_coord);
                    (out_coords.len() - 1) as u32
                });
            rules.push(row as u32, out_row);
        }
    }

    let num_outputs = out_coords.len();
    let out_set = ActiveSet::from_parts(out_coords, out_shape, set.batch_size(), out_rows);
    let book = RuleBook {
        mode: ConvMode::Strided,
        geometry: *geometry,
        num_inputs: set.len(),
        num_outputs,
        taps,
    };
    log::debug!(
        "strided rules: kernel={:?} stride={:?} {} -> {} voxels, shape {} -> {}, pairs={}",
        geometry.kernel,
        geometry.stride,
        set.len(),
        num_outputs,
        set.spatial_shape(),
        out_shape,
        book.num_pairs()
    );
    Ok((out_set, book))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpatialShape;

    fn line_set() -> ActiveSet {
        // Three voxels along the first axis, one isolated voxel
        ActiveSet::new(
            vec![
                VoxelCoord::new(0, 1, 1, 1),
                VoxelCoord::new(0, 2, 1, 1),
                VoxelCoord::new(0, 3, 1, 1),
                VoxelCoord::new(0, 6, 6, 2),
            ],
            SpatialShape::new([8, 8, 4]),
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_submanifold_pairs() {
        let set = line_set();
        let g = ConvGeometry::new([3, 1, 1]);
        let book = build_submanifold(&set, &g).unwrap();

        assert_eq!(book.num_inputs(), 4);
        assert_eq!(book.num_outputs(), 4);
        assert_eq!(book.taps().len(), 3);

        // Tap 0 reads the voxel one step back on axis 0
        assert_eq!(book.taps()[0].pairs().collect::<Vec<_>>(), vec![(0, 1), (1, 2)]);
        // Centre tap is the identity
        assert_eq!(
            book.taps()[1].pairs().collect::<Vec<_>>(),
            vec![(0, 0), (1, 1), (2, 2), (3, 3)]
        );
        assert_eq!(book.taps()[2].pairs().collect::<Vec<_>>(), vec![(1, 0), (2, 1)]);
        assert_eq!(book.num_pairs(), 8);
    }

    #[test]
    fn test_submanifold_rejects_even_kernel() {
        let set = line_set();
        assert!(build_submanifold(&set, &ConvGeometry::new([2, 1, 1])).is_err());
    }

    #[test]
    fn test_strided_discovery_order() {
        let set = line_set();
        let g = ConvGeometry::new([3, 3, 3])
            .with_stride([2, 2, 2])
            .with_padding([1, 1, 1]);
        let (out, book) = build_strided(&set, &g).unwrap();

        assert_eq!(out.spatial_shape().dims(), [4, 4, 2]);
        // Voxel (1,1,1) is odd on every axis: tap 0 reaches (1,1,1) first, tap 2 reaches 0
        assert_eq!(out.coords()[0], VoxelCoord::new(0, 1, 1, 1));
        assert!(out.contains(VoxelCoord::new(0, 0, 0, 0)));
        assert_eq!(book.mode(), ConvMode::Strided);
        assert_eq!(book.num_outputs(), out.len());

        // Every pair satisfies o * s - p + k * d = q
        for (k, rules) in book.taps().iter().enumerate() {
            let tap = g.tap(k);
            for (i, o) in rules.pairs() {
                let q = set.coords()[i as usize].spatial();
                let oc = out.coords()[o as usize].spatial();
                assert_eq!(crate::coords::strided_input(oc, tap, &g), q);
            }
        }
    }

    #[test]
    fn test_strided_is_deterministic() {
        let set = line_set();
        let g = ConvGeometry::new([3, 3, 3])
            .with_stride([2, 2, 1])
            .with_padding([1, 1, 1]);
        let (a, book_a) = build_strided(&set, &g).unwrap();
        let (b, book_b) = build_strided(&set, &g).unwrap();
        assert_eq!(a.coords(), b.coords());
        assert_eq!(book_a, book_b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_inverted_swaps_roles() {
        let set = line_set();
        let g = ConvGeometry::new([3, 3, 3])
            .with_stride([2, 2, 2])
            .with_padding([1, 1, 1]);
        let (_, book) = build_strided(&set, &g).unwrap();
        let inv = book.inverted();

        assert_eq!(inv.mode(), ConvMode::Inverse);
        assert_eq!(inv.num_inputs(), book.num_outputs());
        assert_eq!(inv.num_outputs(), book.num_inputs());
        for (fwd, back) in book.taps().iter().zip(inv.taps()) {
            assert_eq!(fwd.input(), back.output());
            assert_eq!(fwd.output(), back.input());
        }
    }

    #[test]
    fn test_every_input_reaches_an_output() {
        // With padding 1 and kernel 3, every input has at least one exact tap
        let set = line_set();
        let g = ConvGeometry::new([3, 3, 3])
            .with_stride([2, 2, 1])
            .with_padding([1, 1, 1]);
        let (_, book) = build_strided(&set, &g).unwrap();
        let mut seen = vec![false; set.len()];
        for rules in book.taps() {
            for &i in rules.input() {
                seen[i as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
