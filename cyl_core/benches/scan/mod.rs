//! Synthetic LiDAR sweeps shared by the benchmarks and their sanity test.

use cyl_core::VoxelCoord;

/// Grid the sweeps are generated for.
pub const SHAPE: [usize; 3] = [480, 360, 32];

const RINGS: usize = 40;
const LAYERS: usize = SHAPE[2];

/// Largest sweep `cylinder_sweep` can produce.
pub const CAPACITY: usize = RINGS * SHAPE[1] * LAYERS;

/// `count` distinct voxels on concentric cylinders, filling azimuth first,
/// then rings, then height layers.
///
/// Panics if `count` exceeds [`CAPACITY`].
pub fn cylinder_sweep(count: usize) -> Vec<VoxelCoord> {
    assert!(count <= CAPACITY, "sweep holds at most {CAPACITY} voxels, asked for {count}");
    (0..count)
        .map(|i| {
            let phi = i % SHAPE[1];
            let ring = (i / SHAPE[1]) % RINGS;
            let layer = i / (SHAPE[1] * RINGS);
            let rho = 20 + ring * 11;
            // 7 is coprime with the layer count, so each ring visits every height once
            let h = (layer * 7 + ring) % LAYERS;
            VoxelCoord::new(0, rho as i32, phi as i32, h as i32)
        })
        .collect()
}
