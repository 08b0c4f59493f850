//! Core types for sparse voxel indexing.
//!
//! Provides voxel coordinates, grid shapes and convolution geometry used throughout the workspace.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CylCoreError, Result};

/// Integer coordinate of an active voxel: batch slot plus three grid axes.
///
/// Axis order follows the spatial shape, `(z, y, x)`. For a cylindrical
/// LiDAR grid of `[480, 360, 32]` that is `(rho, phi, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelCoord {
    /// Batch slot.
    pub batch: i32,
    /// First spatial axis.
    pub z: i32,
    /// Second spatial axis.
    pub y: i32,
    /// Third spatial axis.
    pub x: i32,
}

impl VoxelCoord {
    /// Create a new VoxelCoord.
    #[inline]
    pub const fn new(batch: i32, z: i32, y: i32, x: i32) -> Self {
        Self { batch, z, y, x }
    }

    /// Build a coordinate from a batch slot and a spatial triple.
    #[inline]
    pub const fn from_spatial(batch: i32, spatial: [i32; 3]) -> Self {
        Self {
            batch,
            z: spatial[0],
            y: spatial[1],
            x: spatial[2],
        }
    }

    /// The spatial part of the coordinate.
    #[inline]
    pub const fn spatial(&self) -> [i32; 3] {
        [self.z, self.y, self.x]
    }

    /// Convert to a `[batch, z, y, x]` array.
    #[inline]
    pub const fn as_array(&self) -> [i32; 4] {
        [self.batch, self.z, self.y, self.x]
    }
}

impl From<[i32; 4]> for VoxelCoord {
    #[inline]
    fn from(arr: [i32; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }
}

impl From<VoxelCoord> for [i32; 4] {
    #[inline]
    fn from(c: VoxelCoord) -> Self {
        c.as_array()
    }
}

impl fmt::Display for VoxelCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.batch, self.z, self.y, self.x)
    }
}

/// Dimensions of the voxel grid, one entry per spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialShape(pub [usize; 3]);

impl SpatialShape {
    /// Create a new SpatialShape.
    #[inline]
    pub const fn new(dims: [usize; 3]) -> Self {
        Self(dims)
    }

    /// Grid dimensions.
    #[inline]
    pub const fn dims(&self) -> [usize; 3] {
        self.0
    }

    /// Number of cells in one batch slot.
    #[inline]
    pub const fn volume(&self) -> usize {
        self.0[0] * self.0[1] * self.0[2]
    }

    /// Check whether a spatial position lies inside the grid.
    #[inline]
    pub fn contains(&self, spatial: [i32; 3]) -> bool {
        spatial
            .iter()
            .zip(self.0.iter())
            .all(|(&c, &d)| c >= 0 && (c as usize) < d)
    }

    /// Row-major cell index of a spatial position within one batch slot.
    ///
    /// The caller must ensure the position is inside the grid.
    #[inline]
    pub fn cell_index(&self, spatial: [i32; 3]) -> usize {
        let [_, d1, d2] = self.0;
        (spatial[0] as usize * d1 + spatial[1] as usize) * d2 + spatial[2] as usize
    }

    /// Shape of the output grid after a strided convolution with `geometry`.
    ///
    /// Per axis: `(d + 2p - dil * (k - 1) - 1) / s + 1`, clamped at zero.
    pub fn downsampled(&self, geometry: &ConvGeometry) -> SpatialShape {
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let span = self.0[axis] as i64 + 2 * geometry.padding[axis] as i64
                - geometry.dilation[axis] as i64 * (geometry.kernel[axis] as i64 - 1)
                - 1;
            out[axis] = if span < 0 {
                0
            } else {
                (span / geometry.stride[axis] as i64 + 1) as usize
            };
        }
        SpatialShape(out)
    }
}

impl From<[usize; 3]> for SpatialShape {
    #[inline]
    fn from(dims: [usize; 3]) -> Self {
        Self(dims)
    }
}

impl fmt::Display for SpatialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.0[0], self.0[1], self.0[2])
    }
}

/// Kernel shape, stride, padding and dilation of a sparse convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvGeometry {
    /// Kernel extent per axis.
    pub kernel: [usize; 3],
    /// Stride per axis.
    pub stride: [usize; 3],
    /// Zero padding per axis.
    pub padding: [usize; 3],
    /// Dilation per axis.
    pub dilation: [usize; 3],
}

impl ConvGeometry {
    /// Geometry with unit stride and dilation and no padding.
    #[inline]
    pub const fn new(kernel: [usize; 3]) -> Self {
        Self {
            kernel,
            stride: [1, 1, 1],
            padding: [0, 0, 0],
            dilation: [1, 1, 1],
        }
    }

    /// Set the stride.
    #[inline]
    pub const fn with_stride(mut self, stride: [usize; 3]) -> Self {
        self.stride = stride;
        self
    }

    /// Set the padding.
    #[inline]
    pub const fn with_padding(mut self, padding: [usize; 3]) -> Self {
        self.padding = padding;
        self
    }

    /// Set the dilation.
    #[inline]
    pub const fn with_dilation(mut self, dilation: [usize; 3]) -> Self {
        self.dilation = dilation;
        self
    }

    /// Number of kernel taps.
    #[inline]
    pub const fn volume(&self) -> usize {
        self.kernel[0] * self.kernel[1] * self.kernel[2]
    }

    /// Flat index of the centre tap (meaningful for odd kernels).
    #[inline]
    pub const fn center_index(&self) -> usize {
        let [k0, k1, k2] = self.kernel;
        ((k0 / 2) * k1 + k1 / 2) * k2 + k2 / 2
    }

    /// Kernel position `[k0, k1, k2]` of a flat tap index.
    #[inline]
    pub const fn tap(&self, index: usize) -> [usize; 3] {
        let [_, k1, k2] = self.kernel;
        [index / (k1 * k2), (index / k2) % k1, index % k2]
    }

    /// Check that every extent, stride and dilation is positive.
    pub fn validate(&self) -> Result<()> {
        for axis in 0..3 {
            if self.kernel[axis] == 0 {
                return Err(CylCoreError::InvalidGeometry {
                    message: format!("kernel extent on axis {} must be positive", axis),
                });
            }
            if self.stride[axis] == 0 {
                return Err(CylCoreError::InvalidGeometry {
                    message: format!("stride on axis {} must be positive", axis),
                });
            }
            if self.dilation[axis] == 0 {
                return Err(CylCoreError::InvalidGeometry {
                    message: format!("dilation on axis {} must be positive", axis),
                });
            }
        }
        Ok(())
    }

    /// Validation for submanifold use: odd kernel extents, unit stride.
    pub fn validate_submanifold(&self) -> Result<()> {
        self.validate()?;
        if self.kernel.iter().any(|k| k % 2 == 0) {
            return Err(CylCoreError::InvalidGeometry {
                message: format!(
                    "submanifold kernels must have odd extents, got {:?}",
                    self.kernel
                ),
            });
        }
        if self.stride != [1, 1, 1] {
            return Err(CylCoreError::InvalidGeometry {
                message: format!("submanifold stride must be 1, got {:?}", self.stride),
            });
        }
        Ok(())
    }
}

/// Which kind of sparse convolution a rule book drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConvMode {
    /// Output occupancy equals input occupancy.
    Submanifold,
    /// Output occupancy is the strided image of the input.
    Strided,
    /// Output occupancy is the input occupancy of a recorded strided convolution.
    Inverse,
}

impl fmt::Display for ConvMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvMode::Submanifold => write!(f, "submanifold"),
            ConvMode::Strided => write!(f, "strided"),
            ConvMode::Inverse => write!(f, "inverse"),
        }
    }
}
