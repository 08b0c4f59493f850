//! Context aggregation block.

use burn::module::Module;
use burn::prelude::*;

use cyl_core::RuleProvider;

use crate::config::WeightInit;
use crate::error::Result;
use crate::sparse::SparseTensor;

use super::ConvActNorm;

/// Two asymmetric residual paths at full resolution, summed.
///
/// Path A runs 1x3x3 then 3x1x3, path B runs 3x1x3 then 1x3x3.
#[derive(Module, Debug)]
pub struct ResContextBlock<B: Backend> {
    a1: ConvActNorm<B>,
    a2: ConvActNorm<B>,
    b1: ConvActNorm<B>,
    b2: ConvActNorm<B>,
}

impl<B: Backend> ResContextBlock<B> {
    /// Create a new block.
    pub fn new(
        in_filters: usize,
        out_filters: usize,
        init: &WeightInit,
        device: &B::Device,
    ) -> Result<Self> {
        Ok(Self {
            a1: ConvActNorm::new([in_filters, out_filters], [1, 3, 3], init, device)?,
            a2: ConvActNorm::new([out_filters, out_filters], [3, 1, 3], init, device)?,
            b1: ConvActNorm::new([in_filters, out_filters], [3, 1, 3], init, device)?,
            b2: ConvActNorm::new([out_filters, out_filters], [1, 3, 3], init, device)?,
        })
    }

    /// Forward pass. The active set is unchanged.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        rules: &mut dyn RuleProvider,
    ) -> Result<SparseTensor<B>> {
        let shortcut = self.a1.forward(x.clone(), rules)?;
        let shortcut = self.a2.forward(shortcut, rules)?;

        let res = self.b1.forward(x, rules)?;
        let res = self.b2.forward(res, rules)?;

        res.add(shortcut)
    }
}
