//! Sparse voxel tensors.
//!
//! A [`SparseTensor`] pairs a dense `[N, C]` feature matrix with the immutable
//! [`ActiveSet`](cyl_core::ActiveSet) that names the voxel of every row.

mod tensor;

pub use tensor::SparseTensor;
pub(crate) use tensor::voxel_coords;

use burn::prelude::*;

/// Upload row indices as an integer tensor.
pub(crate) fn row_index<B: Backend>(rows: &[u32], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = rows.iter().map(|&r| r as i64).collect();
    Tensor::from_data(TensorData::new(data, [rows.len()]), device)
}
