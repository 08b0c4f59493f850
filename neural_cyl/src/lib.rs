//! # neural_cyl
//!
//! Sparse 3D convolution network for LiDAR semantic segmentation on a
//! cylindrical voxel grid, built with Burn.
//!
//! Points are voxelized upstream into a `(rho, phi, height)` grid such as
//! `[480, 360, 32]`. Only occupied voxels are stored and convolved; the rule
//! books that drive every sparse convolution come from `cyl_core`.
//!
//! ## Features
//!
//! - **Sparse tensors**: `SparseTensor<B>` pairs `[N, C]` features with a shared active set
//! - **Sparse convolutions**: submanifold, strided and inverse 3D convolutions
//! - **Asymmetric blocks**: context, residual, up and reconstruction blocks
//! - **Network**: `Asymm3dSpconv<B>` with plain, dropout, ensemble, open-set and
//!   gaussian-centre forward passes
//!
//! ## Quick Start
//!
//! ```ignore
//! use neural_cyl::{Asymm3dConfig, predict::point_labels};
//! use burn::backend::NdArray;
//!
//! let device = Default::default();
//! let net = Asymm3dConfig::new([480, 360, 32])
//!     .with_num_input_features(9)
//!     .init::<NdArray>(&device)?;
//!
//! // features: [N, 9], coords: [N, 4] as (batch, rho, phi, height)
//! let scores = net.forward(features, coords, 1)?;
//! let labels = point_labels(scores, &point_voxels)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! cyl_core (indexing)              neural_cyl (tensors)
//!   ActiveSet ──────────────────►  SparseTensor
//!   RuleCache: RuleProvider ────►  SubMConv3d / SparseConv3d / SparseInverseConv3d
//!   DownsampleKey ──────────────►  ResBlock ──► UpBlock
//!                                        │
//!                                        ▼
//!                                  Asymm3dSpconv ──► dense [B, classes, d0, d1, d2]
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Standard library support
//! - `ndarray` (default): CPU backend using ndarray
//! - `wgpu`: GPU acceleration via WebGPU
//! - `rayon`: Parallel rule-book generation in `cyl_core`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod network;
pub mod nn;
pub mod predict;
pub mod sparse;

// Re-export key types for convenience
pub use config::{Asymm3dConfig, SparseConvConfig, WeightInit};
pub use error::{NeuralCylError, Result};
pub use network::Asymm3dSpconv;
pub use sparse::SparseTensor;

// Re-export from cyl_core for convenience
pub use cyl_core::{DownsampleKey, RuleCache, SpatialShape, VoxelCoord};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{Asymm3dConfig, SparseConvConfig, WeightInit};
    pub use crate::error::{NeuralCylError, Result};
    pub use crate::network::{gaussian_centre_scores, open_set_scores, Asymm3dSpconv};
    pub use crate::nn::{
        Pooling, ReconBlock, ResBlock, ResBlockOutput, ResContextBlock, SparseBatchNorm,
        SparseBatchNormConfig, SparseConv3d, SparseDropout, SparseInverseConv3d, SparseKernel,
        SubMConv3d, UpBlock,
    };
    pub use crate::predict::point_labels;
    pub use crate::sparse::SparseTensor;

    pub use cyl_core::{
        ActiveSet, ConvGeometry, DownsampleKey, RuleBook, RuleCache, RuleProvider, SpatialShape,
        VoxelCoord,
    };
}
