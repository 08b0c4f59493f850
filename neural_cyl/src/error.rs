//! Error types for neural_cyl.

use burn::tensor::DataError;
use thiserror::Error;

use cyl_core::{CylCoreError, DownsampleKey};

/// Errors that can occur while building or running the sparse network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NeuralCylError {
    /// Tensor shape mismatch.
    #[error("tensor shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// An inverse convolution referenced a downsampling stage unknown to the current pass.
    #[error("downsample key {key} not registered in this forward pass")]
    KeyNotFound {
        /// The unknown key.
        key: DownsampleKey,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Tensor data could not be read back in the requested element type.
    #[error("tensor readback failed: {message}")]
    TensorRead {
        /// Description of the readback failure.
        message: String,
    },

    /// Indexing error from cyl_core.
    #[error("indexing error: {0}")]
    Index(#[source] CylCoreError),
}

impl NeuralCylError {
    /// Whether this error reports inputs inconsistent with the configured grid or channels.
    pub fn is_shape_mismatch(&self) -> bool {
        match self {
            NeuralCylError::ShapeMismatch { .. } => true,
            NeuralCylError::Index(err) => err.is_shape_mismatch(),
            _ => false,
        }
    }

    pub(crate) fn shape(expected: &[usize], got: &[usize]) -> Self {
        NeuralCylError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}

impl From<CylCoreError> for NeuralCylError {
    fn from(err: CylCoreError) -> Self {
        match err {
            CylCoreError::KeyNotFound { key } => NeuralCylError::KeyNotFound { key },
            other => NeuralCylError::Index(other),
        }
    }
}

impl From<DataError> for NeuralCylError {
    fn from(err: DataError) -> Self {
        NeuralCylError::TensorRead {
            message: format!("{err:?}"),
        }
    }
}

/// Result type for neural_cyl operations.
pub type Result<T> = std::result::Result<T, NeuralCylError>;
