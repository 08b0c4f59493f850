//! Configuration types for neural_cyl.
//!
//! Burn-style configuration structs for the sparse convolution layers and the
//! asymmetric encoder-decoder network. All of them serialize to JSON through
//! Burn's `Config` trait.

mod conv;
mod network;

pub use conv::{SparseConvConfig, WeightInit};
pub use network::Asymm3dConfig;
