//! Error types for cyl_core operations.

use thiserror::Error;

use crate::cache::DownsampleKey;
use crate::types::VoxelCoord;

/// Errors that can occur while indexing active voxels or building rule books.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CylCoreError {
    /// A voxel lies outside the spatial shape of its grid.
    #[error("voxel {coord} lies outside spatial shape {spatial_shape:?}")]
    CoordOutOfBounds {
        /// The offending coordinate.
        coord: VoxelCoord,
        /// The grid dimensions.
        spatial_shape: [usize; 3],
    },

    /// A voxel refers to a batch slot that does not exist.
    #[error("voxel batch index {batch} out of range for batch size {batch_size}")]
    BatchOutOfRange {
        /// The batch index of the voxel.
        batch: i32,
        /// The configured batch size.
        batch_size: usize,
    },

    /// The same voxel appears twice in one coordinate set.
    #[error("duplicate active voxel {coord}")]
    DuplicateVoxel {
        /// The duplicated coordinate.
        coord: VoxelCoord,
    },

    /// An inverse convolution referenced a downsampling stage that was never recorded
    /// in this rule cache.
    #[error("no strided convolution registered under key {key}")]
    KeyNotFound {
        /// The unknown key.
        key: DownsampleKey,
    },

    /// Two operands were expected to share one active set but do not.
    #[error("active set mismatch: expected {expected} voxels (set {expected_id}), got {got} voxels (set {got_id})")]
    ActiveSetMismatch {
        /// Identifier of the expected set.
        expected_id: u64,
        /// Size of the expected set.
        expected: usize,
        /// Identifier of the provided set.
        got_id: u64,
        /// Size of the provided set.
        got: usize,
    },

    /// Kernel geometry is unusable for the requested operation.
    #[error("invalid convolution geometry: {message}")]
    InvalidGeometry {
        /// Description of the problem.
        message: String,
    },
}

impl CylCoreError {
    /// Whether this error reports coordinates inconsistent with the configured grid.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            CylCoreError::CoordOutOfBounds { .. }
                | CylCoreError::BatchOutOfRange { .. }
                | CylCoreError::DuplicateVoxel { .. }
                | CylCoreError::ActiveSetMismatch { .. }
        )
    }
}

/// Result type for cyl_core operations.
pub type Result<T> = std::result::Result<T, CylCoreError>;
