//! Dropout with an explicit random source.

use burn::module::Module;
use burn::prelude::*;
use rand::{Rng, RngCore};

/// Inverted dropout over an `[N, C]` feature matrix.
///
/// Each entry is zeroed with probability `prob` and survivors are scaled by
/// `1 / (1 - prob)`. The mask is drawn from the caller's RNG, so a seeded RNG
/// reproduces the same mask on every backend.
#[derive(Module, Clone, Debug)]
pub struct SparseDropout {
    #[module(skip)]
    prob: f64,
}

impl SparseDropout {
    /// Create a new dropout layer.
    pub fn new(prob: f64) -> Self {
        Self { prob }
    }

    /// Drop probability.
    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Forward pass. Without an RNG the layer is the identity.
    pub fn forward<B: Backend>(
        &self,
        x: Tensor<B, 2>,
        rng: Option<&mut dyn RngCore>,
    ) -> Tensor<B, 2> {
        let Some(rng) = rng else {
            return x;
        };
        if self.prob <= 0.0 {
            return x;
        }

        let [rows, channels] = x.dims();
        let keep_scale = (1.0 / (1.0 - self.prob)) as f32;
        let mask: Vec<f32> = (0..rows * channels)
            .map(|_| {
                if rng.gen::<f64>() < self.prob {
                    0.0
                } else {
                    keep_scale
                }
            })
            .collect();
        let mask = Tensor::<B, 2>::from_data(TensorData::new(mask, [rows, channels]), &x.device());
        x * mask
    }
}
