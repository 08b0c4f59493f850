//! Sparse network layers.
//!
//! This module provides:
//! - Convolutions: submanifold, strided and inverse 3D convolutions over an active set
//! - Normalization and dropout on `[N, C]` feature rows
//! - Blocks: the residual, context, upsampling and reconstruction units of the network

pub mod blocks;
pub mod conv;
pub mod dropout;
pub mod norm;

pub use blocks::{Pooling, ReconBlock, ResBlock, ResBlockOutput, ResContextBlock, UpBlock};
pub use conv::{SparseConv3d, SparseInverseConv3d, SparseKernel, SubMConv3d};
pub use dropout::SparseDropout;
pub use norm::{SparseBatchNorm, SparseBatchNormConfig};
