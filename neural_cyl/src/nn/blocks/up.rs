//! Decoder upsampling block.

use burn::module::Module;
use burn::prelude::*;

use cyl_core::{DownsampleKey, RuleProvider};

use crate::config::{SparseConvConfig, WeightInit};
use crate::error::Result;
use crate::nn::conv::SparseInverseConv3d;
use crate::sparse::SparseTensor;

use super::ConvActNorm;

/// Upsampling block: 3x3x3 convolution at the coarse level, inverse convolution
/// back to the recorded fine set, skip addition, then 1x3x3, 3x1x3 and 3x3x3
/// refinement.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    trans: ConvActNorm<B>,
    up: SparseInverseConv3d<B>,
    c1: ConvActNorm<B>,
    c2: ConvActNorm<B>,
    c3: ConvActNorm<B>,
}

impl<B: Backend> UpBlock<B> {
    /// Create a new block.
    pub fn new(
        in_filters: usize,
        out_filters: usize,
        init: &WeightInit,
        device: &B::Device,
    ) -> Result<Self> {
        let out = [out_filters, out_filters];
        Ok(Self {
            trans: ConvActNorm::new([in_filters, out_filters], [3, 3, 3], init, device)?,
            up: SparseConvConfig::new(out, [3, 3, 3])
                .with_initializer(init.clone())
                .init_inverse(device)?,
            c1: ConvActNorm::new(out, [1, 3, 3], init, device)?,
            c2: ConvActNorm::new(out, [3, 1, 3], init, device)?,
            c3: ConvActNorm::new(out, [3, 3, 3], init, device)?,
        })
    }

    /// Forward pass.
    ///
    /// `key` must name the strided stage that produced `x`'s active set, and
    /// `skip` must live on the set that stage consumed.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        skip: SparseTensor<B>,
        key: DownsampleKey,
        rules: &mut dyn RuleProvider,
    ) -> Result<SparseTensor<B>> {
        let up = self.trans.forward(x, rules)?;
        let up = self.up.forward(up, key, rules)?;
        let up = up.add(skip)?;

        let up = self.c1.forward(up, rules)?;
        let up = self.c2.forward(up, rules)?;
        self.c3.forward(up, rules)
    }
}
