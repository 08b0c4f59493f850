//! Encoder residual block with optional downsampling.

use burn::module::Module;
use burn::prelude::*;

use cyl_core::{DownsampleKey, RuleProvider};

use crate::config::{SparseConvConfig, WeightInit};
use crate::error::Result;
use crate::nn::conv::SparseConv3d;
use crate::sparse::SparseTensor;

use super::ConvActNorm;

/// Downsampling applied after the residual paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// Keep the resolution.
    None,
    /// Halve every axis, stride (2, 2, 2).
    Full,
    /// Halve the first two axes only, stride (2, 2, 1).
    Planar,
}

impl Pooling {
    fn stride(self) -> Option<[usize; 3]> {
        match self {
            Pooling::None => None,
            Pooling::Full => Some([2, 2, 2]),
            Pooling::Planar => Some([2, 2, 1]),
        }
    }
}

/// Output of a [`ResBlock`].
#[derive(Debug, Clone)]
pub struct ResBlockOutput<B: Backend> {
    /// Downsampled tensor and the key of its stage, when the block pools.
    pub down: Option<(SparseTensor<B>, DownsampleKey)>,
    /// Full-resolution sum of both paths, kept for the decoder skip connection.
    pub skip: SparseTensor<B>,
}

/// Two asymmetric residual paths, summed, then an optional strided 3x3x3 convolution.
///
/// Path A runs 3x1x3 then 1x3x3, path B runs 1x3x3 then 3x1x3.
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    a1: ConvActNorm<B>,
    a2: ConvActNorm<B>,
    b1: ConvActNorm<B>,
    b2: ConvActNorm<B>,
    pool: Option<SparseConv3d<B>>,
}

impl<B: Backend> ResBlock<B> {
    /// Create a new block.
    pub fn new(
        in_filters: usize,
        out_filters: usize,
        pooling: Pooling,
        init: &WeightInit,
        device: &B::Device,
    ) -> Result<Self> {
        let pool = pooling
            .stride()
            .map(|stride| {
                SparseConvConfig::new([out_filters, out_filters], [3, 3, 3])
                    .with_stride(stride)
                    .with_padding([1, 1, 1])
                    .with_initializer(init.clone())
                    .init_strided(device)
            })
            .transpose()?;

        Ok(Self {
            a1: ConvActNorm::new([in_filters, out_filters], [3, 1, 3], init, device)?,
            a2: ConvActNorm::new([out_filters, out_filters], [1, 3, 3], init, device)?,
            b1: ConvActNorm::new([in_filters, out_filters], [1, 3, 3], init, device)?,
            b2: ConvActNorm::new([out_filters, out_filters], [3, 1, 3], init, device)?,
            pool,
        })
    }

    /// Forward pass.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        rules: &mut dyn RuleProvider,
    ) -> Result<ResBlockOutput<B>> {
        let shortcut = self.a1.forward(x.clone(), rules)?;
        let shortcut = self.a2.forward(shortcut, rules)?;

        let res = self.b1.forward(x, rules)?;
        let res = self.b2.forward(res, rules)?;
        let skip = res.add(shortcut)?;

        let down = match &self.pool {
            Some(pool) => Some(pool.forward(skip.clone(), rules)?),
            None => None,
        };

        Ok(ResBlockOutput { down, skip })
    }
}
