//! Sparse tensor implementation.

use std::sync::Arc;

use burn::prelude::*;

use cyl_core::{ActiveSet, SpatialShape, VoxelCoord};

use crate::error::{NeuralCylError, Result};

/// Feature vectors of the active voxels of a batched 3D grid.
///
/// Row `i` of `features` belongs to `active.coords()[i]`. The active set is
/// shared by reference count between every tensor with the same occupancy;
/// operations never mutate features in place, they return new tensors.
#[derive(Debug, Clone)]
pub struct SparseTensor<B: Backend> {
    features: Tensor<B, 2>,
    active: Arc<ActiveSet>,
}

impl<B: Backend> SparseTensor<B> {
    /// Build a sparse tensor from features `[N, C]` and `N` voxel coordinates.
    ///
    /// Fails when a coordinate is outside `spatial_shape`, its batch index is not
    /// below `batch_size`, a coordinate repeats, or the row counts differ.
    pub fn new(
        features: Tensor<B, 2>,
        coords: Vec<VoxelCoord>,
        spatial_shape: SpatialShape,
        batch_size: usize,
    ) -> Result<Self> {
        let [rows, channels] = features.dims();
        if rows != coords.len() {
            return Err(NeuralCylError::shape(&[coords.len(), channels], &[rows, channels]));
        }
        let active = ActiveSet::new(coords, spatial_shape, batch_size)?;
        Ok(Self {
            features,
            active: Arc::new(active),
        })
    }

    /// Build a sparse tensor from features `[N, C]` and an integer `[N, 4]`
    /// coordinate matrix with columns `(batch, z, y, x)`.
    pub fn from_tensors(
        features: Tensor<B, 2>,
        coords: Tensor<B, 2, Int>,
        spatial_shape: SpatialShape,
        batch_size: usize,
    ) -> Result<Self> {
        let coords = voxel_coords(coords)?;
        Self::new(features, coords, spatial_shape, batch_size)
    }

    /// Attach features to an existing active set.
    pub fn from_parts(features: Tensor<B, 2>, active: Arc<ActiveSet>) -> Result<Self> {
        let [rows, channels] = features.dims();
        if rows != active.len() {
            return Err(NeuralCylError::shape(&[active.len(), channels], &[rows, channels]));
        }
        Ok(Self { features, active })
    }

    /// Feature matrix `[N, C]`.
    #[inline]
    pub fn features(&self) -> &Tensor<B, 2> {
        &self.features
    }

    /// Consume the tensor, returning its feature matrix.
    #[inline]
    pub fn into_features(self) -> Tensor<B, 2> {
        self.features
    }

    /// The shared active set.
    #[inline]
    pub fn active(&self) -> &Arc<ActiveSet> {
        &self.active
    }

    /// Active coordinates in row order.
    #[inline]
    pub fn coords(&self) -> &[VoxelCoord] {
        self.active.coords()
    }

    /// Integer `[N, 4]` coordinate matrix with columns `(batch, z, y, x)`.
    pub fn coords_tensor(&self) -> Tensor<B, 2, Int> {
        let data: Vec<i64> = self
            .coords()
            .iter()
            .flat_map(|c| c.as_array())
            .map(i64::from)
            .collect();
        Tensor::from_data(
            TensorData::new(data, [self.len(), 4]),
            &self.features.device(),
        )
    }

    /// Grid dimensions.
    #[inline]
    pub fn spatial_shape(&self) -> SpatialShape {
        self.active.spatial_shape()
    }

    /// Number of batch slots.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.active.batch_size()
    }

    /// Number of active voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of feature channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.features.dims()[1]
    }

    /// Same coordinates, new features.
    pub fn with_features(&self, features: Tensor<B, 2>) -> Result<Self> {
        Self::from_parts(features, Arc::clone(&self.active))
    }

    /// Apply a row-preserving function to the features.
    pub fn map_features(self, f: impl FnOnce(Tensor<B, 2>) -> Tensor<B, 2>) -> Self {
        let features = f(self.features);
        debug_assert_eq!(features.dims()[0], self.active.len());
        Self {
            features,
            active: self.active,
        }
    }

    /// Element-wise sum of two tensors over the identical active set.
    pub fn add(self, other: SparseTensor<B>) -> Result<Self> {
        self.check_same_layout(&other)?;
        Ok(Self {
            features: self.features + other.features,
            active: self.active,
        })
    }

    /// Element-wise product of two tensors over the identical active set.
    pub fn mul_features(self, other: SparseTensor<B>) -> Result<Self> {
        self.check_same_layout(&other)?;
        Ok(Self {
            features: self.features * other.features,
            active: self.active,
        })
    }

    /// Concatenate channels of two tensors over the identical active set.
    ///
    /// The result has `self` channels first.
    pub fn cat_features(self, other: SparseTensor<B>) -> Result<Self> {
        self.active.ensure_same(&other.active)?;
        Ok(Self {
            features: Tensor::cat(vec![self.features, other.features], 1),
            active: self.active,
        })
    }

    /// Scatter features into a zero-initialized `[batch, C, d0, d1, d2]` volume.
    pub fn dense(&self) -> Tensor<B, 5> {
        let [d0, d1, d2] = self.spatial_shape().dims();
        let batch = self.batch_size();
        let channels = self.num_channels();
        let device = self.features.device();

        let flat = Tensor::<B, 2>::zeros([batch * d0 * d1 * d2, channels], &device);
        let flat = if self.is_empty() {
            flat
        } else {
            flat.select_assign(0, self.cell_index(&device), self.features.clone())
        };

        flat.reshape([batch, d0, d1, d2, channels])
            .permute([0, 4, 1, 2, 3])
    }

    /// Read the rows of the active voxels back out of a dense volume.
    ///
    /// `volume` must be `[batch, C, d0, d1, d2]` for this tensor's grid; the
    /// channel count may differ from this tensor's.
    pub fn gather_dense(&self, volume: Tensor<B, 5>) -> Result<Tensor<B, 2>> {
        let [d0, d1, d2] = self.spatial_shape().dims();
        let batch = self.batch_size();
        let dims = volume.dims();
        let channels = dims[1];
        if dims != [batch, channels, d0, d1, d2] {
            return Err(NeuralCylError::shape(&[batch, channels, d0, d1, d2], &dims));
        }

        let device = volume.device();
        if self.is_empty() {
            return Ok(Tensor::zeros([0, channels], &device));
        }

        let flat = volume
            .permute([0, 2, 3, 4, 1])
            .reshape([batch * d0 * d1 * d2, channels]);
        Ok(flat.select(0, self.cell_index(&device)))
    }

    fn cell_index(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        let data: Vec<i64> = self
            .active
            .linear_indices()
            .into_iter()
            .map(|i| i as i64)
            .collect();
        Tensor::from_data(TensorData::new(data, [self.len()]), device)
    }

    fn check_same_layout(&self, other: &SparseTensor<B>) -> Result<()> {
        self.active.ensure_same(&other.active)?;
        let (a, b) = (self.features.dims(), other.features.dims());
        if a != b {
            return Err(NeuralCylError::shape(&a, &b));
        }
        Ok(())
    }
}

/// Read an integer `[N, 4]` coordinate matrix into voxel coordinates.
pub(crate) fn voxel_coords<B: Backend>(coords: Tensor<B, 2, Int>) -> Result<Vec<VoxelCoord>> {
    let [rows, cols] = coords.dims();
    if cols != 4 {
        return Err(NeuralCylError::shape(&[rows, 4], &[rows, cols]));
    }
    let values: Vec<i64> = coords.into_data().iter::<i64>().collect();
    Ok(values
        .chunks_exact(4)
        .map(|c| {
            // Values outside i32 can never be in bounds; saturate so validation rejects them
            let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            VoxelCoord::new(clamp(c[0]), clamp(c[1]), clamp(c[2]), clamp(c[3]))
        })
        .collect())
}
