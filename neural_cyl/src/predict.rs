//! Reading per-point predictions out of dense class volumes.

use burn::prelude::*;

use cyl_core::{CylCoreError, SpatialShape, VoxelCoord};

use crate::error::{NeuralCylError, Result};

/// Predicted class of each point, read from the voxel it falls into.
///
/// `dense` is `[batch, classes, d0, d1, d2]`; `coords` holds one voxel per
/// point and may repeat voxels. Ties resolve to the lowest class index.
pub fn point_labels<B: Backend>(dense: Tensor<B, 5>, coords: &[VoxelCoord]) -> Result<Vec<usize>> {
    let [batch, classes, d0, d1, d2] = dense.dims();
    if classes == 0 {
        return Err(NeuralCylError::shape(&[batch, 1, d0, d1, d2], &dense.dims()));
    }
    if coords.is_empty() {
        return Ok(Vec::new());
    }

    let shape = SpatialShape::new([d0, d1, d2]);
    let mut cells = Vec::with_capacity(coords.len());
    for &coord in coords {
        if coord.batch < 0 || coord.batch as usize >= batch {
            return Err(CylCoreError::BatchOutOfRange {
                batch: coord.batch,
                batch_size: batch,
            }
            .into());
        }
        if !shape.contains(coord.spatial()) {
            return Err(CylCoreError::CoordOutOfBounds {
                coord,
                spatial_shape: shape.dims(),
            }
            .into());
        }
        let cell = coord.batch as usize * shape.volume() + shape.cell_index(coord.spatial());
        cells.push(cell as i64);
    }

    let device = dense.device();
    let index = Tensor::<B, 1, Int>::from_data(TensorData::new(cells, [coords.len()]), &device);
    let scores = dense
        .permute([0, 2, 3, 4, 1])
        .reshape([batch * d0 * d1 * d2, classes])
        .select(0, index);

    let values: Vec<f32> = scores.into_data().convert::<f32>().to_vec()?;

    Ok(values
        .chunks_exact(classes)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (c, &v)| if v > best.1 { (c, v) } else { best })
                .0
        })
        .collect())
}
