//! Immutable sets of active voxels with O(1) coordinate lookup.

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::coords::linear_index;
use crate::error::{CylCoreError, Result};
use crate::types::{SpatialShape, VoxelCoord};

static NEXT_SET_ID: AtomicU64 = AtomicU64::new(1);

fn next_set_id() -> u64 {
    NEXT_SET_ID.fetch_add(1, Ordering::Relaxed)
}

/// Ordered, duplicate-free set of active voxels inside one grid.
///
/// Row `i` of any feature matrix attached to this set belongs to `coords()[i]`.
/// Each set carries a process-unique id; two sets with the same id are the same
/// occupancy pattern in the same order.
#[derive(Debug)]
pub struct ActiveSet {
    id: u64,
    coords: Vec<VoxelCoord>,
    spatial_shape: SpatialShape,
    batch_size: usize,
    /// Linear index -> row.
    rows: FxHashMap<u64, u32>,
}

impl ActiveSet {
    /// Build a set from coordinates, checking bounds, batch range and uniqueness.
    pub fn new(
        coords: Vec<VoxelCoord>,
        spatial_shape: SpatialShape,
        batch_size: usize,
    ) -> Result<Self> {
        let mut rows = FxHashMap::default();
        rows.reserve(coords.len());

        for (row, &coord) in coords.iter().enumerate() {
            check_voxel(coord, spatial_shape, batch_size)?;
            if rows
                .insert(linear_index(coord, spatial_shape), row as u32)
                .is_some()
            {
                return Err(CylCoreError::DuplicateVoxel { coord });
            }
        }

        Ok(Self::from_parts(coords, spatial_shape, batch_size, rows))
    }

    /// Build a set from coordinates already known to be valid and unique.
    pub(crate) fn from_parts(
        coords: Vec<VoxelCoord>,
        spatial_shape: SpatialShape,
        batch_size: usize,
        rows: FxHashMap<u64, u32>,
    ) -> Self {
        Self {
            id: next_set_id(),
            coords,
            spatial_shape,
            batch_size,
            rows,
        }
    }

    /// Split coordinates into the rows that fit the grid and those that don't.
    ///
    /// Returns the row indices of in-bounds voxels, in order. Used by callers that
    /// tolerate malformed input by dropping it.
    pub fn in_bounds_rows(
        coords: &[VoxelCoord],
        spatial_shape: SpatialShape,
        batch_size: usize,
    ) -> Vec<usize> {
        coords
            .iter()
            .enumerate()
            .filter(|&(_, &c)| check_voxel(c, spatial_shape, batch_size).is_ok())
            .map(|(row, _)| row)
            .collect()
    }

    /// Process-unique identifier of this set.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of active voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Active coordinates in row order.
    #[inline]
    pub fn coords(&self) -> &[VoxelCoord] {
        &self.coords
    }

    /// Grid dimensions.
    #[inline]
    pub fn spatial_shape(&self) -> SpatialShape {
        self.spatial_shape
    }

    /// Number of batch slots.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Row of a coordinate, if active.
    #[inline]
    pub fn row_of(&self, coord: VoxelCoord) -> Option<usize> {
        if check_voxel(coord, self.spatial_shape, self.batch_size).is_err() {
            return None;
        }
        self.rows
            .get(&linear_index(coord, self.spatial_shape))
            .map(|&r| r as usize)
    }

    /// Check whether a coordinate is active.
    #[inline]
    pub fn contains(&self, coord: VoxelCoord) -> bool {
        self.row_of(coord).is_some()
    }

    /// Dense linear index of every active voxel, in row order.
    pub fn linear_indices(&self) -> Vec<u64> {
        self.coords
            .iter()
            .map(|&c| linear_index(c, self.spatial_shape))
            .collect()
    }

    /// Require `other` to be this exact set.
    pub fn ensure_same(&self, other: &ActiveSet) -> Result<()> {
        if self.id == other.id {
            Ok(())
        } else {
            Err(CylCoreError::ActiveSetMismatch {
                expected_id: self.id,
                expected: self.len(),
                got_id: other.id,
                got: other.len(),
            })
        }
    }
}

fn check_voxel(coord: VoxelCoord, spatial_shape: SpatialShape, batch_size: usize) -> Result<()> {
    if coord.batch < 0 || coord.batch as usize >= batch_size {
        return Err(CylCoreError::BatchOutOfRange {
            batch: coord.batch,
            batch_size,
        });
    }
    if !spatial_shape.contains(coord.spatial()) {
        return Err(CylCoreError::CoordOutOfBounds {
            coord,
            spatial_shape: spatial_shape.dims(),
        });
    }
    Ok(())
}
