//! Residual, context, upsampling and reconstruction blocks.
//!
//! Every block is a composition of [`ConvActNorm`] or [`ConvNormGate`] units. The
//! parallel paths inside a block always convolve the same active set, so their
//! outputs can be summed row by row.

mod context;
mod recon;
mod residual;
mod up;

pub use context::ResContextBlock;
pub use recon::ReconBlock;
pub use residual::{Pooling, ResBlock, ResBlockOutput};
pub use up::UpBlock;

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, sigmoid};

use cyl_core::RuleProvider;

use crate::config::{SparseConvConfig, WeightInit};
use crate::error::Result;
use crate::sparse::SparseTensor;

use super::conv::SubMConv3d;
use super::norm::{SparseBatchNorm, SparseBatchNormConfig};

/// Negative slope of every LeakyReLU in the network.
pub const LEAKY_SLOPE: f64 = 0.01;

/// Submanifold convolution, then LeakyReLU, then batch norm.
#[derive(Module, Debug)]
pub struct ConvActNorm<B: Backend> {
    conv: SubMConv3d<B>,
    norm: SparseBatchNorm<B>,
}

impl<B: Backend> ConvActNorm<B> {
    /// Create a new unit with a bias-free convolution.
    pub fn new(
        channels: [usize; 2],
        kernel_size: [usize; 3],
        init: &WeightInit,
        device: &B::Device,
    ) -> Result<Self> {
        Ok(Self {
            conv: SparseConvConfig::new(channels, kernel_size)
                .with_initializer(init.clone())
                .init_subm(device)?,
            norm: SparseBatchNormConfig::new(channels[1]).init(device),
        })
    }

    /// Forward pass.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        rules: &mut dyn RuleProvider,
    ) -> Result<SparseTensor<B>> {
        let y = self.conv.forward(x, rules)?;
        Ok(y.map_features(|f| self.norm.forward(leaky_relu(f, LEAKY_SLOPE))))
    }
}

/// Submanifold convolution, then batch norm, then a sigmoid gate.
#[derive(Module, Debug)]
pub struct ConvNormGate<B: Backend> {
    conv: SubMConv3d<B>,
    norm: SparseBatchNorm<B>,
}

impl<B: Backend> ConvNormGate<B> {
    /// Create a new unit with a bias-free convolution.
    pub fn new(
        channels: [usize; 2],
        kernel_size: [usize; 3],
        init: &WeightInit,
        device: &B::Device,
    ) -> Result<Self> {
        Ok(Self {
            conv: SparseConvConfig::new(channels, kernel_size)
                .with_initializer(init.clone())
                .init_subm(device)?,
            norm: SparseBatchNormConfig::new(channels[1]).init(device),
        })
    }

    /// Forward pass. Output features lie in `(0, 1)`.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        rules: &mut dyn RuleProvider,
    ) -> Result<SparseTensor<B>> {
        let y = self.conv.forward(x, rules)?;
        Ok(y.map_features(|f| sigmoid(self.norm.forward(f))))
    }
}
