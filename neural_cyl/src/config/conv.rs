//! Sparse convolution layer configuration.

use burn::config::Config;

use cyl_core::ConvGeometry;

/// Weight initialization scheme for sparse convolution layers.
#[derive(Config, Debug, PartialEq)]
pub enum WeightInit {
    /// Kaiming-uniform weights with gain `1/sqrt(3)`, fan-in `K * C_in`.
    Kaiming,
    /// Every weight and bias entry set to `value`.
    Constant {
        /// The fill value.
        value: f64,
    },
    /// Identity matrix on the centre tap for the first `min(C_in, C_out)` channels,
    /// zero elsewhere and zero bias.
    CenterIdentity,
}

/// Configuration for a sparse 3D convolution.
///
/// Padding is only meaningful for strided convolutions; submanifold kernels are
/// always centred on the output voxel.
#[derive(Config, Debug)]
pub struct SparseConvConfig {
    /// Input and output channels.
    pub channels: [usize; 2],

    /// Kernel extent per axis.
    pub kernel_size: [usize; 3],

    /// Stride per axis.
    #[config(default = "[1, 1, 1]")]
    pub stride: [usize; 3],

    /// Zero padding per axis.
    #[config(default = "[0, 0, 0]")]
    pub padding: [usize; 3],

    /// Dilation per axis.
    #[config(default = "[1, 1, 1]")]
    pub dilation: [usize; 3],

    /// Whether to learn a per-channel bias.
    #[config(default = false)]
    pub bias: bool,

    /// Weight initialization.
    #[config(default = "WeightInit::Kaiming")]
    pub initializer: WeightInit,
}

impl SparseConvConfig {
    /// Kernel geometry described by this configuration.
    pub fn geometry(&self) -> ConvGeometry {
        ConvGeometry::new(self.kernel_size)
            .with_stride(self.stride)
            .with_padding(self.padding)
            .with_dilation(self.dilation)
    }

    /// Number of kernel taps.
    pub fn kernel_volume(&self) -> usize {
        self.kernel_size.iter().product()
    }
}
