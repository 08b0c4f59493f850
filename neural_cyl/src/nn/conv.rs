//! Sparse 3D convolutions.
//!
//! All three layer types share one kernel: for every tap `k` of the rule book,
//! gather the input rows, multiply by `W[k]` and scatter-add into the output rows.
//! They differ only in which rule book they ask the [`RuleProvider`] for.

use burn::module::{Ignored, Module, Param};
use burn::nn::Initializer;
use burn::prelude::*;

use cyl_core::{ConvGeometry, DownsampleKey, RuleBook, RuleProvider};

use crate::config::{SparseConvConfig, WeightInit};
use crate::error::{NeuralCylError, Result};
use crate::sparse::{row_index, SparseTensor};

/// Learnable weights shared by every sparse convolution type.
///
/// Weight layout is `[K, C_in, C_out]` with `K` the number of kernel taps.
#[derive(Module, Debug)]
pub struct SparseKernel<B: Backend> {
    /// Per-tap weight matrices.
    pub weight: Param<Tensor<B, 3>>,
    /// Optional per-channel bias.
    pub bias: Option<Param<Tensor<B, 1>>>,
    geometry: Ignored<ConvGeometry>,
}

impl<B: Backend> SparseKernel<B> {
    fn new(config: &SparseConvConfig, device: &B::Device) -> Result<Self> {
        let [c_in, c_out] = config.channels;
        let geometry = config.geometry();
        geometry.validate()?;
        let taps = geometry.volume();
        let fan_in = taps * c_in;
        let fan_out = taps * c_out;

        let (weight, bias): (Param<Tensor<B, 3>>, Option<Param<Tensor<B, 1>>>) = match &config
            .initializer
        {
            WeightInit::Kaiming => {
                let init = Initializer::KaimingUniform {
                    gain: 1.0 / 3.0f64.sqrt(),
                    fan_out_only: false,
                };
                let weight = init.init_with([taps, c_in, c_out], Some(fan_in), Some(fan_out), device);
                let bias = config
                    .bias
                    .then(|| init.init_with([c_out], Some(fan_in), Some(fan_out), device));
                (weight, bias)
            }
            WeightInit::Constant { value } => {
                let init = Initializer::Constant { value: *value };
                let weight = init.init([taps, c_in, c_out], device);
                let bias = config.bias.then(|| init.init([c_out], device));
                (weight, bias)
            }
            WeightInit::CenterIdentity => {
                let mut data = vec![0.0f32; taps * c_in * c_out];
                let centre = geometry.center_index();
                for c in 0..c_in.min(c_out) {
                    data[(centre * c_in + c) * c_out + c] = 1.0;
                }
                let weight = Param::from_tensor(Tensor::from_data(
                    TensorData::new(data, [taps, c_in, c_out]),
                    device,
                ));
                let bias = config
                    .bias
                    .then(|| Param::from_tensor(Tensor::zeros([c_out], device)));
                (weight, bias)
            }
        };

        Ok(Self {
            weight,
            bias,
            geometry: Ignored(geometry),
        })
    }

    /// Kernel geometry.
    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry.0
    }

    /// Input and output channels.
    pub fn channels(&self) -> [usize; 2] {
        let [_, c_in, c_out] = self.weight.dims();
        [c_in, c_out]
    }

    fn check_input(&self, x: &SparseTensor<B>) -> Result<()> {
        let [c_in, _] = self.channels();
        if x.num_channels() != c_in {
            return Err(NeuralCylError::shape(
                &[x.len(), c_in],
                &[x.len(), x.num_channels()],
            ));
        }
        Ok(())
    }

    /// Run the gather/matmul/scatter kernel over `rules`.
    fn apply(&self, features: &Tensor<B, 2>, rules: &RuleBook) -> Tensor<B, 2> {
        let [taps, c_in, c_out] = self.weight.dims();
        let device = features.device();
        let weight = self.weight.val();

        let mut out = Tensor::<B, 2>::zeros([rules.num_outputs(), c_out], &device);
        for (k, tap) in rules.taps().iter().enumerate().take(taps) {
            if tap.is_empty() {
                continue;
            }
            let w_k = weight
                .clone()
                .slice([k..k + 1, 0..c_in, 0..c_out])
                .reshape([c_in, c_out]);
            let gathered = features.clone().select(0, row_index::<B>(tap.input(), &device));
            out = out.select_assign(0, row_index::<B>(tap.output(), &device), gathered.matmul(w_k));
        }

        match &self.bias {
            Some(bias) => out + bias.val().reshape([1, c_out]),
            None => out,
        }
    }
}

/// Submanifold sparse convolution: output occupancy equals input occupancy.
#[derive(Module, Debug)]
pub struct SubMConv3d<B: Backend> {
    kernel: SparseKernel<B>,
}

impl<B: Backend> SubMConv3d<B> {
    /// Forward pass.
    ///
    /// Output rows are the input rows, in the same order.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        rules: &mut dyn RuleProvider,
    ) -> Result<SparseTensor<B>> {
        self.kernel.check_input(&x)?;
        let book = rules.submanifold(x.active(), self.kernel.geometry())?;
        let features = self.kernel.apply(x.features(), &book);
        x.with_features(features)
    }

    /// Learnable weights.
    pub fn kernel(&self) -> &SparseKernel<B> {
        &self.kernel
    }
}

/// Strided sparse convolution: the output occupancy is the strided image of the input.
#[derive(Module, Debug)]
pub struct SparseConv3d<B: Backend> {
    kernel: SparseKernel<B>,
}

impl<B: Backend> SparseConv3d<B> {
    /// Forward pass.
    ///
    /// Returns the downsampled tensor and the key under which this stage was
    /// recorded, for the paired [`SparseInverseConv3d`].
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        rules: &mut dyn RuleProvider,
    ) -> Result<(SparseTensor<B>, DownsampleKey)> {
        self.kernel.check_input(&x)?;
        let stage = rules.strided(x.active(), self.kernel.geometry())?;
        let features = self.kernel.apply(x.features(), &stage.rules);
        Ok((SparseTensor::from_parts(features, stage.output)?, stage.key))
    }

    /// Learnable weights.
    pub fn kernel(&self) -> &SparseKernel<B> {
        &self.kernel
    }
}

/// Inverse sparse convolution: restores the occupancy recorded before a strided stage.
#[derive(Module, Debug)]
pub struct SparseInverseConv3d<B: Backend> {
    kernel: SparseKernel<B>,
}

impl<B: Backend> SparseInverseConv3d<B> {
    /// Forward pass.
    ///
    /// `x` must live on the set produced by the strided stage recorded under `key`.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        key: DownsampleKey,
        rules: &mut dyn RuleProvider,
    ) -> Result<SparseTensor<B>> {
        self.kernel.check_input(&x)?;
        let stage = rules.inverse(key, x.active())?;

        let recorded = stage.rules.geometry().kernel;
        let own = self.kernel.geometry().kernel;
        if recorded != own {
            return Err(NeuralCylError::shape(&recorded, &own));
        }

        let features = self.kernel.apply(x.features(), &stage.rules);
        SparseTensor::from_parts(features, stage.output)
    }

    /// Learnable weights.
    pub fn kernel(&self) -> &SparseKernel<B> {
        &self.kernel
    }
}

impl SparseConvConfig {
    /// Initialize a submanifold convolution.
    ///
    /// Fails when any kernel extent, stride or dilation is zero.
    pub fn init_subm<B: Backend>(&self, device: &B::Device) -> Result<SubMConv3d<B>> {
        Ok(SubMConv3d {
            kernel: SparseKernel::new(self, device)?,
        })
    }

    /// Initialize a strided convolution.
    pub fn init_strided<B: Backend>(&self, device: &B::Device) -> Result<SparseConv3d<B>> {
        Ok(SparseConv3d {
            kernel: SparseKernel::new(self, device)?,
        })
    }

    /// Initialize an inverse convolution.
    ///
    /// Only the kernel extent matters; stride and padding come from the recorded stage.
    pub fn init_inverse<B: Backend>(&self, device: &B::Device) -> Result<SparseInverseConv3d<B>> {
        Ok(SparseInverseConv3d {
            kernel: SparseKernel::new(self, device)?,
        })
    }
}
