//! Batch normalization over sparse feature rows.

use burn::config::Config;
use burn::module::{Module, Param, RunningState};
use burn::prelude::*;

/// Configuration for [`SparseBatchNorm`].
#[derive(Config, Debug)]
pub struct SparseBatchNormConfig {
    /// Number of feature channels.
    pub num_features: usize,
    /// Added to the variance before the square root.
    #[config(default = 1e-5)]
    pub epsilon: f64,
    /// Weight of the current batch in the running statistics.
    #[config(default = 0.1)]
    pub momentum: f64,
}

impl SparseBatchNormConfig {
    /// Initialize with unit scale, zero shift, zero running mean and unit running variance.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SparseBatchNorm<B> {
        let c = self.num_features;
        SparseBatchNorm {
            gamma: Param::from_tensor(Tensor::ones([c], device)),
            beta: Param::from_tensor(Tensor::zeros([c], device)),
            running_mean: RunningState::new(Tensor::zeros([c], device)),
            running_var: RunningState::new(Tensor::ones([c], device)),
            epsilon: self.epsilon,
            momentum: self.momentum,
        }
    }
}

/// Per-channel batch normalization of an `[N, C]` feature matrix.
///
/// Every active voxel is one sample. On autodiff backends the batch statistics
/// normalize the input and update the running statistics; otherwise the running
/// statistics are used as-is.
#[derive(Module, Debug)]
pub struct SparseBatchNorm<B: Backend> {
    /// Scale.
    pub gamma: Param<Tensor<B, 1>>,
    /// Shift.
    pub beta: Param<Tensor<B, 1>>,
    /// Running mean.
    pub running_mean: RunningState<Tensor<B, 1>>,
    /// Running variance.
    pub running_var: RunningState<Tensor<B, 1>>,
    #[module(skip)]
    epsilon: f64,
    #[module(skip)]
    momentum: f64,
}

impl<B: Backend> SparseBatchNorm<B> {
    /// Forward pass.
    ///
    /// Input shape: [N, C]
    /// Output shape: [N, C]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [rows, channels] = x.dims();
        if rows == 0 {
            return x;
        }

        let (mean, var) = if B::ad_enabled() {
            self.batch_stats(x.clone())
        } else {
            (
                self.running_mean.value().reshape([1, channels]),
                self.running_var.value().reshape([1, channels]),
            )
        };

        let scale = self.gamma.val().reshape([1, channels]);
        let shift = self.beta.val().reshape([1, channels]);
        (x - mean) / (var + self.epsilon).sqrt() * scale + shift
    }

    fn batch_stats(&self, x: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let channels = x.dims()[1];
        let mean = x.clone().mean_dim(0);
        let var = (x - mean.clone()).powf_scalar(2.0).mean_dim(0);

        let m = self.momentum;
        let running_mean = self.running_mean.value_sync();
        let running_var = self.running_var.value_sync();
        self.running_mean.update(
            running_mean * (1.0 - m) + mean.clone().detach().reshape([channels]) * m,
        );
        self.running_var
            .update(running_var * (1.0 - m) + var.clone().detach().reshape([channels]) * m);

        (mean, var)
    }
}
