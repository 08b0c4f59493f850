//! Network configuration.

use burn::config::Config;

use crate::error::NeuralCylError;

use super::WeightInit;

/// Configuration for the asymmetric sparse 3D segmentation network.
#[derive(Config, Debug)]
pub struct Asymm3dConfig {
    /// Voxel grid dimensions `[d0, d1, d2]`, e.g. `[480, 360, 32]` for a cylindrical grid.
    pub spatial_shape: [usize; 3],

    /// Channels of the per-voxel input features.
    #[config(default = 128)]
    pub num_input_features: usize,

    /// Number of semantic classes.
    #[config(default = 20)]
    pub num_classes: usize,

    /// Base channel width; stages use multiples of it up to `16 * init_size`.
    #[config(default = 16)]
    pub init_size: usize,

    /// Reject out-of-bounds voxels instead of dropping them.
    #[config(default = false)]
    pub strict: bool,

    /// Classes of the optional auxiliary (open-set) head.
    pub aux_classes: Option<usize>,

    /// Initialization of every sparse convolution.
    #[config(default = "WeightInit::Kaiming")]
    pub weight_init: WeightInit,

    /// Drop probability of the stochastic reconstruction block.
    #[config(default = 0.5)]
    pub recon_dropout: f64,

    /// Centre magnitude of the gaussian-centre head.
    #[config(default = 1.0)]
    pub dml_magnitude: f64,
}

impl Asymm3dConfig {
    /// Check that every dimension and width is usable.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.spatial_shape.iter().any(|&d| d == 0) {
            return Err(invalid(format!(
                "spatial_shape must be positive on every axis, got {:?}",
                self.spatial_shape
            )));
        }
        if self.num_input_features == 0 {
            return Err(invalid("num_input_features must be positive".into()));
        }
        if self.num_classes == 0 {
            return Err(invalid("num_classes must be positive".into()));
        }
        if self.init_size == 0 {
            return Err(invalid("init_size must be positive".into()));
        }
        if self.aux_classes == Some(0) {
            return Err(invalid("aux_classes must be positive when set".into()));
        }
        if !(0.0..1.0).contains(&self.recon_dropout) {
            return Err(invalid(format!(
                "recon_dropout must lie in [0, 1), got {}",
                self.recon_dropout
            )));
        }
        Ok(())
    }

    /// Channel width of the concatenated tensor fed to the output heads.
    pub fn head_channels(&self) -> usize {
        4 * self.init_size
    }
}

fn invalid(message: String) -> NeuralCylError {
    NeuralCylError::InvalidConfig { message }
}
