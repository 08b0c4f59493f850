//! Coordinate mathematics for sparse convolutions.
//!
//! Maps voxel positions through kernel taps for the submanifold and strided
//! cases, and flattens voxel coordinates into dense linear indices.

use crate::types::{ConvGeometry, SpatialShape, VoxelCoord};

/// Flatten a voxel into its row-major index in a `(batch, d0, d1, d2)` volume.
///
/// The caller must ensure the voxel is inside `shape` with a non-negative batch.
#[inline]
pub fn linear_index(coord: VoxelCoord, shape: SpatialShape) -> u64 {
    coord.batch as u64 * shape.volume() as u64 + shape.cell_index(coord.spatial()) as u64
}

/// Neighbour of `center` reached through kernel tap `tap` of a centred kernel.
///
/// Per axis: `center + (tap - k / 2) * dilation`. Padding is ignored since the
/// submanifold output is anchored on the input voxels themselves.
#[inline]
pub fn submanifold_neighbor(center: [i32; 3], tap: [usize; 3], geometry: &ConvGeometry) -> [i32; 3] {
    let mut out = [0i32; 3];
    for axis in 0..3 {
        let half = (geometry.kernel[axis] / 2) as i32;
        out[axis] = center[axis] + (tap[axis] as i32 - half) * geometry.dilation[axis] as i32;
    }
    out
}

/// Output position that input `input` feeds through kernel tap `tap`, if any.
///
/// Solves `o * stride - padding + tap * dilation = input` per axis. Returns
/// `None` when the division is inexact or the result falls outside `out_shape`.
#[inline]
pub fn strided_output(
    input: [i32; 3],
    tap: [usize; 3],
    geometry: &ConvGeometry,
    out_shape: SpatialShape,
) -> Option<[i32; 3]> {
    let mut out = [0i32; 3];
    for axis in 0..3 {
        let numerator = input[axis] as i64 + geometry.padding[axis] as i64
            - (tap[axis] * geometry.dilation[axis]) as i64;
        let stride = geometry.stride[axis] as i64;
        if numerator < 0 || numerator % stride != 0 {
            return None;
        }
        let o = numerator / stride;
        if o >= out_shape.0[axis] as i64 {
            return None;
        }
        out[axis] = o as i32;
    }
    Some(out)
}

/// Input position read by output `output` through kernel tap `tap` of a strided kernel.
///
/// Inverse of [`strided_output`]; the result may lie outside the input grid.
#[inline]
pub fn strided_input(output: [i32; 3], tap: [usize; 3], geometry: &ConvGeometry) -> [i32; 3] {
    let mut out = [0i32; 3];
    for axis in 0..3 {
        out[axis] = output[axis] * geometry.stride[axis] as i32 - geometry.padding[axis] as i32
            + (tap[axis] * geometry.dilation[axis]) as i32;
    }
    out
}
