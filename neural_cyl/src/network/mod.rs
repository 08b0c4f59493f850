//! The asymmetric sparse 3D encoder-decoder.
//!
//! ```text
//! context (i) ─► res2 (2i) ─► res3 (4i) ─► res4 (8i) ─► res5 (16i)
//!                  │ skip        │ skip        │ skip        │ skip, pooled
//!                  ▼             ▼             ▼             ▼
//! recon ◄─ up3 (2i) ◄──── up2 (4i) ◄──── up1 (8i) ◄──── up0 (16i)
//!   │
//!   └─► [recon ++ up3] (4i) ─► logits 3x3x3 ─► dense
//! ```
//!
//! Every forward call owns a fresh [`RuleCache`]; strided stages hand their
//! [`DownsampleKey`](cyl_core::DownsampleKey) to the up block that inverts them.

mod heads;

pub use heads::{gaussian_centre_scores, open_set_scores};

use burn::module::{Ignored, Module};
use burn::prelude::*;
use rand::RngCore;

use cyl_core::{ActiveSet, DownsampleKey, RuleCache, RuleProvider, SpatialShape, VoxelCoord};

use crate::config::{Asymm3dConfig, SparseConvConfig};
use crate::error::{NeuralCylError, Result};
use crate::nn::blocks::{Pooling, ReconBlock, ResBlock, ResBlockOutput, ResContextBlock, UpBlock};
use crate::nn::conv::SubMConv3d;
use crate::sparse::{row_index, voxel_coords, SparseTensor};

impl Asymm3dConfig {
    /// Validate the configuration and initialize the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Asymm3dSpconv<B>> {
        self.validate()?;

        let i = self.init_size;
        let init = &self.weight_init;
        let head = self.head_channels();

        let logits = |classes: usize| -> Result<SubMConv3d<B>> {
            SparseConvConfig::new([head, classes], [3, 3, 3])
                .with_bias(true)
                .with_initializer(init.clone())
                .init_subm(device)
        };

        log::info!(
            "Asymm3dSpconv: grid {:?}, {} input channels, widths {}..{}, {} classes{}",
            self.spatial_shape,
            self.num_input_features,
            i,
            16 * i,
            self.num_classes,
            match self.aux_classes {
                Some(aux) => format!(", {aux} auxiliary classes"),
                None => String::new(),
            }
        );

        Ok(Asymm3dSpconv {
            context: ResContextBlock::new(self.num_input_features, i, init, device)?,
            res2: ResBlock::new(i, 2 * i, Pooling::Full, init, device)?,
            res3: ResBlock::new(2 * i, 4 * i, Pooling::Full, init, device)?,
            res4: ResBlock::new(4 * i, 8 * i, Pooling::Planar, init, device)?,
            res5: ResBlock::new(8 * i, 16 * i, Pooling::Planar, init, device)?,
            up0: UpBlock::new(16 * i, 16 * i, init, device)?,
            up1: UpBlock::new(16 * i, 8 * i, init, device)?,
            up2: UpBlock::new(8 * i, 4 * i, init, device)?,
            up3: UpBlock::new(4 * i, 2 * i, init, device)?,
            recon: ReconBlock::new(2 * i, 2 * i, None, init, device)?,
            recon_dropout: ReconBlock::new(2 * i, 2 * i, Some(self.recon_dropout), init, device)?,
            logits: logits(self.num_classes)?,
            aux_logits: self.aux_classes.map(logits).transpose()?,
            spatial_shape: Ignored(SpatialShape::new(self.spatial_shape)),
            num_input_features: self.num_input_features,
            num_classes: self.num_classes,
            strict: self.strict,
            dml_magnitude: self.dml_magnitude,
        })
    }
}

/// Sparse asymmetric 3D segmentation network over a cylindrical voxel grid.
///
/// Produces dense class scores `[batch, num_classes, d0, d1, d2]` that are
/// non-zero only where the input has active voxels (plus the logits bias).
#[derive(Module, Debug)]
pub struct Asymm3dSpconv<B: Backend> {
    context: ResContextBlock<B>,
    res2: ResBlock<B>,
    res3: ResBlock<B>,
    res4: ResBlock<B>,
    res5: ResBlock<B>,
    up0: UpBlock<B>,
    up1: UpBlock<B>,
    up2: UpBlock<B>,
    up3: UpBlock<B>,
    recon: ReconBlock<B>,
    recon_dropout: ReconBlock<B>,
    logits: SubMConv3d<B>,
    aux_logits: Option<SubMConv3d<B>>,
    spatial_shape: Ignored<SpatialShape>,
    #[module(skip)]
    num_input_features: usize,
    #[module(skip)]
    num_classes: usize,
    #[module(skip)]
    strict: bool,
    #[module(skip)]
    dml_magnitude: f64,
}

impl<B: Backend> Asymm3dSpconv<B> {
    /// Grid dimensions the network was built for.
    pub fn spatial_shape(&self) -> SpatialShape {
        self.spatial_shape.0
    }

    /// Number of semantic classes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Whether invalid voxels are rejected rather than dropped.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Whether the auxiliary open-set head is present.
    pub fn has_aux_head(&self) -> bool {
        self.aux_logits.is_some()
    }

    /// Segment a scan given as features `[N, C_in]` and an integer `[N, 4]`
    /// coordinate matrix `(batch, z, y, x)`.
    ///
    /// Returns `[batch_size, num_classes, d0, d1, d2]`.
    pub fn forward(
        &self,
        features: Tensor<B, 2>,
        coords: Tensor<B, 2, Int>,
        batch_size: usize,
    ) -> Result<Tensor<B, 5>> {
        let input = self.prepare_input(features, coords, batch_size)?;
        self.forward_sparse(input)
    }

    /// Build the network input from a coordinate matrix, applying the strict
    /// or lenient voxel policy of the configuration.
    pub fn prepare_input(
        &self,
        features: Tensor<B, 2>,
        coords: Tensor<B, 2, Int>,
        batch_size: usize,
    ) -> Result<SparseTensor<B>> {
        let coords = voxel_coords(coords)?;
        self.prepare_voxels(features, coords, batch_size)
    }

    /// Build the network input from voxel coordinates.
    ///
    /// In lenient mode voxels outside the grid or the batch are dropped with a
    /// warning; in strict mode they are an error. Repeated voxels and a wrong
    /// feature width are always errors.
    pub fn prepare_voxels(
        &self,
        features: Tensor<B, 2>,
        coords: Vec<VoxelCoord>,
        batch_size: usize,
    ) -> Result<SparseTensor<B>> {
        let [rows, channels] = features.dims();
        if channels != self.num_input_features {
            return Err(NeuralCylError::shape(
                &[rows, self.num_input_features],
                &[rows, channels],
            ));
        }
        if rows != coords.len() {
            return Err(NeuralCylError::shape(&[coords.len(), channels], &[rows, channels]));
        }

        let spatial_shape = self.spatial_shape();
        if self.strict {
            return SparseTensor::new(features, coords, spatial_shape, batch_size);
        }

        let keep = ActiveSet::in_bounds_rows(&coords, spatial_shape, batch_size);
        if keep.len() == coords.len() {
            return SparseTensor::new(features, coords, spatial_shape, batch_size);
        }

        log::warn!(
            "Dropping {} of {} voxels outside grid {:?} or batch size {}",
            coords.len() - keep.len(),
            coords.len(),
            spatial_shape.dims(),
            batch_size
        );
        let device = features.device();
        let features = if keep.is_empty() {
            Tensor::zeros([0, channels], &device)
        } else {
            let rows: Vec<u32> = keep.iter().map(|&r| r as u32).collect();
            features.select(0, row_index::<B>(&rows, &device))
        };
        let coords = keep.into_iter().map(|r| coords[r]).collect();
        SparseTensor::new(features, coords, spatial_shape, batch_size)
    }

    /// Segment a prepared sparse tensor.
    pub fn forward_sparse(&self, input: SparseTensor<B>) -> Result<Tensor<B, 5>> {
        let (features, mut rules) = self.forward_features(input)?;
        Ok(self.logits.forward(features, &mut rules)?.dense())
    }

    /// Run everything up to the logits convolution.
    ///
    /// Returns the concatenated `[recon, up3]` tensor with `4 * init_size`
    /// channels, together with the rule cache of the pass so further heads can
    /// reuse its rule books.
    pub fn forward_features(&self, input: SparseTensor<B>) -> Result<(SparseTensor<B>, RuleCache)> {
        let mut rules = RuleCache::new();
        let decoded = self.decode(input, &mut rules)?;
        let features = self.reconstruct(decoded, &self.recon, &mut rules, None)?;
        Ok((features, rules))
    }

    /// Segment with the stochastic reconstruction block, drawing its dropout
    /// masks from `rng`.
    pub fn forward_dropout(&self, input: SparseTensor<B>, rng: &mut dyn RngCore) -> Result<Tensor<B, 5>> {
        let mut rules = RuleCache::new();
        let decoded = self.decode(input, &mut rules)?;
        let features = self.reconstruct(decoded, &self.recon_dropout, &mut rules, Some(rng))?;
        Ok(self.logits.forward(features, &mut rules)?.dense())
    }

    /// Run the encoder and decoder once, then `passes` stochastic
    /// reconstruction and logits passes.
    ///
    /// The dense outputs are stacked along the batch axis:
    /// `[passes * batch_size, num_classes, d0, d1, d2]`, pass-major.
    pub fn forward_dropout_ensemble(
        &self,
        input: SparseTensor<B>,
        passes: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Tensor<B, 5>> {
        if passes == 0 {
            return Err(NeuralCylError::InvalidConfig {
                message: "dropout ensemble needs at least one pass".into(),
            });
        }

        let mut rules = RuleCache::new();
        let decoded = self.decode(input, &mut rules)?;

        let mut volumes = Vec::with_capacity(passes);
        for _ in 0..passes {
            let rng = Some(&mut *rng as &mut dyn RngCore);
            let features = self.reconstruct(decoded.clone(), &self.recon_dropout, &mut rules, rng)?;
            volumes.push(self.logits.forward(features, &mut rules)?.dense());
        }
        log::debug!("Dropout ensemble of {} passes, rule cache {:?}", passes, rules.stats());

        Ok(Tensor::cat(volumes, 0))
    }

    /// Segment with an extra "unknown" channel: the maximum over the
    /// auxiliary head's logits, appended after the main class logits.
    ///
    /// Returns `[batch_size, num_classes + 1, d0, d1, d2]`.
    pub fn forward_open_set(&self, input: SparseTensor<B>) -> Result<Tensor<B, 5>> {
        let aux_head = self.aux_logits.as_ref().ok_or_else(|| NeuralCylError::InvalidConfig {
            message: "network was built without aux_classes".into(),
        })?;

        let (features, mut rules) = self.forward_features(input)?;
        let main = self.logits.forward(features.clone(), &mut rules)?;
        let aux = aux_head.forward(features, &mut rules)?;

        let scores = open_set_scores(main.features().clone(), aux.into_features());
        Ok(main.with_features(scores)?.dense())
    }

    /// Segment with gaussian-centre scores: channel `i` is the negative squared
    /// distance of the logit vector to the scaled one-hot centre of class `i`.
    pub fn forward_dml(&self, input: SparseTensor<B>) -> Result<Tensor<B, 5>> {
        let logits = self.forward_sparse(input)?;
        Ok(gaussian_centre_scores(logits, self.dml_magnitude))
    }

    fn check_input(&self, input: &SparseTensor<B>) -> Result<()> {
        if input.spatial_shape() != self.spatial_shape() {
            return Err(NeuralCylError::shape(
                &self.spatial_shape().dims(),
                &input.spatial_shape().dims(),
            ));
        }
        if input.num_channels() != self.num_input_features {
            return Err(NeuralCylError::shape(
                &[input.len(), self.num_input_features],
                &[input.len(), input.num_channels()],
            ));
        }
        Ok(())
    }

    /// Encoder and decoder; returns the `2 * init_size` output of the last up block.
    fn decode(&self, input: SparseTensor<B>, rules: &mut dyn RuleProvider) -> Result<SparseTensor<B>> {
        self.check_input(&input)?;

        let x = self.context.forward(input, rules)?;
        let (x2, key2, skip2) = pooled(self.res2.forward(x, rules)?)?;
        let (x3, key3, skip3) = pooled(self.res3.forward(x2, rules)?)?;
        let (x4, key4, skip4) = pooled(self.res4.forward(x3, rules)?)?;
        let (x5, key5, skip5) = pooled(self.res5.forward(x4, rules)?)?;

        let up = self.up0.forward(x5, skip5, key5, rules)?;
        let up = self.up1.forward(up, skip4, key4, rules)?;
        let up = self.up2.forward(up, skip3, key3, rules)?;
        self.up3.forward(up, skip2, key2, rules)
    }

    fn reconstruct(
        &self,
        decoded: SparseTensor<B>,
        recon: &ReconBlock<B>,
        rules: &mut dyn RuleProvider,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<SparseTensor<B>> {
        let gated = recon.forward(decoded.clone(), rules, rng)?;
        gated.cat_features(decoded)
    }
}

fn pooled<B: Backend>(
    output: ResBlockOutput<B>,
) -> Result<(SparseTensor<B>, DownsampleKey, SparseTensor<B>)> {
    match output.down {
        Some((down, key)) => Ok((down, key, output.skip)),
        None => Err(NeuralCylError::InvalidConfig {
            message: "encoder stage built without pooling".into(),
        }),
    }
}
