//! # cyl_core
//!
//! Indexing math for sparse 3D convolutions over voxel grids.
//!
//! This crate holds everything a sparse convolution needs except the tensors:
//! voxel coordinates, grid shapes, kernel geometry, immutable active sets and the
//! rule books that map input rows to output rows. It has no tensor dependency,
//! so it can be tested and benchmarked on its own.
//!
//! ## Feature Flags
//!
//! - `rayon` (default): Build submanifold rule books in parallel over kernel taps
//! - `serde`: Serialize/deserialize coordinate and geometry types
//!
//! ## Modules
//!
//! - [`types`]: Core data types (VoxelCoord, SpatialShape, ConvGeometry, ConvMode)
//! - [`coords`]: Coordinate mapping through kernel taps
//! - [`active_set`]: Ordered, duplicate-free voxel sets with O(1) lookup
//! - [`rules`]: Rule-book generation for submanifold and strided convolutions
//! - [`cache`]: Per-forward-pass rule cache and typed downsample keys
//! - [`traits`]: The `RuleProvider` seam used by convolution layers
//! - [`error`]: Error types
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use cyl_core::prelude::*;
//!
//! let set = Arc::new(ActiveSet::new(
//!     vec![VoxelCoord::new(0, 2, 2, 2), VoxelCoord::new(0, 2, 3, 2)],
//!     SpatialShape::new([8, 8, 8]),
//!     1,
//! ).unwrap());
//!
//! let mut cache = RuleCache::new();
//! let subm = cache.submanifold(&set, &ConvGeometry::new([3, 3, 3])).unwrap();
//! assert_eq!(subm.num_outputs(), 2);
//!
//! let pool = ConvGeometry::new([3, 3, 3]).with_stride([2, 2, 2]).with_padding([1, 1, 1]);
//! let down = cache.strided(&set, &pool).unwrap();
//! let up = cache.inverse(down.key, &down.output).unwrap();
//! assert_eq!(up.output.coords(), set.coords());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod active_set;
pub mod cache;
pub mod coords;
pub mod error;
pub mod rules;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// Provides the most commonly used types and functions.
pub mod prelude {
    pub use crate::active_set::ActiveSet;
    pub use crate::cache::{CacheStats, DownsampleKey, InverseRules, RuleCache, StridedRules};
    pub use crate::error::{CylCoreError, Result};
    pub use crate::rules::{build_strided, build_submanifold, RuleBook, TapRules};
    pub use crate::traits::RuleProvider;
    pub use crate::types::{ConvGeometry, ConvMode, SpatialShape, VoxelCoord};
}

// Re-export everything at crate root for convenience
pub use active_set::ActiveSet;
pub use cache::{CacheStats, DownsampleKey, InverseRules, RuleCache, StridedRules};
pub use coords::{linear_index, strided_input, strided_output, submanifold_neighbor};
pub use error::{CylCoreError, Result};
pub use rules::{build_strided, build_submanifold, RuleBook, TapRules};
pub use traits::RuleProvider;
pub use types::{ConvGeometry, ConvMode, SpatialShape, VoxelCoord};
