//! Dimension-decomposed reconstruction block.

use burn::module::Module;
use burn::prelude::*;
use rand::RngCore;

use cyl_core::RuleProvider;

use crate::config::WeightInit;
use crate::error::Result;
use crate::nn::dropout::SparseDropout;
use crate::sparse::SparseTensor;

use super::ConvNormGate;

/// Three gated branches along each axis (3x1x1, 1x3x1, 1x1x3), summed and used
/// to rescale the block input element-wise.
///
/// With a dropout probability set, each gate is independently dropped out when
/// the caller supplies an RNG.
#[derive(Module, Debug)]
pub struct ReconBlock<B: Backend> {
    branches: Vec<ConvNormGate<B>>,
    dropout: Option<SparseDropout>,
}

impl<B: Backend> ReconBlock<B> {
    /// Create a new block; `dropout` is the per-gate drop probability, if any.
    pub fn new(
        in_filters: usize,
        out_filters: usize,
        dropout: Option<f64>,
        init: &WeightInit,
        device: &B::Device,
    ) -> Result<Self> {
        let branches = [[3, 1, 1], [1, 3, 1], [1, 1, 3]]
            .into_iter()
            .map(|kernel| ConvNormGate::new([in_filters, out_filters], kernel, init, device))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            branches,
            dropout: dropout.map(SparseDropout::new),
        })
    }

    /// Forward pass.
    ///
    /// The output lives on the input's active set.
    pub fn forward(
        &self,
        x: SparseTensor<B>,
        rules: &mut dyn RuleProvider,
        mut rng: Option<&mut dyn RngCore>,
    ) -> Result<SparseTensor<B>> {
        let mut gates: Option<SparseTensor<B>> = None;
        for branch in &self.branches {
            let gate = branch.forward(x.clone(), rules)?;
            let gate = match &self.dropout {
                Some(dropout) => {
                    let rng = rng.as_deref_mut().map(|r| r as &mut dyn RngCore);
                    gate.map_features(|f| dropout.forward(f, rng))
                }
                None => gate,
            };
            gates = Some(match gates {
                Some(sum) => sum.add(gate)?,
                None => gate,
            });
        }

        match gates {
            Some(gates) => gates.mul_features(x),
            None => Ok(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use cyl_core::{RuleCache, SpatialShape, VoxelCoord};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;

    /// Two neighbours along the first axis, two channels
    fn pair(device: &<TestBackend as Backend>::Device) -> SparseTensor<TestBackend> {
        SparseTensor::new(
            Tensor::from_data([[1.0f32, 2.0], [3.0, 4.0]], device),
            vec![VoxelCoord::new(0, 0, 0, 0), VoxelCoord::new(0, 1, 0, 0)],
            SpatialShape::new([4, 4, 4]),
            1,
        )
        .unwrap()
    }

    fn sigmoid(v: f32) -> f32 {
        1.0 / (1.0 + (-v).exp())
    }

    fn values(x: &SparseTensor<TestBackend>) -> Vec<f32> {
        x.features().clone().into_data().to_vec().unwrap()
    }

    #[test]
    fn test_zero_weights_scale_by_one_and_a_half() {
        let device = Default::default();
        let block = ReconBlock::<TestBackend>::new(
            2,
            2,
            None,
            &WeightInit::Constant { value: 0.0 },
            &device,
        )
        .unwrap();
        let mut cache = RuleCache::new();

        // Each gate is sigmoid(0) = 0.5
        let y = block.forward(pair(&device), &mut cache, None).unwrap();
        let got = values(&y);
        for (g, e) in got.iter().zip([1.5f32, 3.0, 4.5, 6.0]) {
            assert!((g - e).abs() < 1e-6, "{g} != {e}");
        }
    }

    #[test]
    fn test_hand_computed_gates() {
        let device = Default::default();
        let block = ReconBlock::<TestBackend>::new(
            2,
            2,
            None,
            &WeightInit::Constant { value: 0.1 },
            &device,
        )
        .unwrap();
        let mut cache = RuleCache::new();

        // 3x1x1 sees both voxels: 0.1 * (3 + 7) = 1.0 for either row.
        // 1x3x1 and 1x1x3 see only the voxel itself: 0.3 and 0.7.
        let s = 1.0 / (1.0f32 + 1e-5).sqrt();
        let gate_a = sigmoid(1.0 * s) + 2.0 * sigmoid(0.3 * s);
        let gate_b = sigmoid(1.0 * s) + 2.0 * sigmoid(0.7 * s);
        let expected = [gate_a, 2.0 * gate_a, 3.0 * gate_b, 4.0 * gate_b];

        let y = block.forward(pair(&device), &mut cache, None).unwrap();
        for (g, e) in values(&y).iter().zip(expected) {
            assert!((g - e).abs() < 1e-5, "{g} != {e}");
        }
    }

    #[test]
    fn test_dropout_is_seeded() {
        let device = Default::default();
        let block = ReconBlock::<TestBackend>::new(
            2,
            2,
            Some(0.5),
            &WeightInit::Constant { value: 0.0 },
            &device,
        )
        .unwrap();

        let run = |seed: u64| {
            let mut cache = RuleCache::new();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let y = block
                .forward(pair(&device), &mut cache, Some(&mut rng))
                .unwrap();
            values(&y)
        };

        let a = run(3);
        assert_eq!(a, run(3));
        // Each gate is 0 or 2 * 0.5, so the total gate is an integer in 0..=3
        for (v, x) in a.iter().zip([1.0f32, 2.0, 3.0, 4.0]) {
            let gate = v / x;
            assert!((gate - gate.round()).abs() < 1e-4, "gate {gate}");
            assert!((-1e-4..=3.0001).contains(&gate));
        }

        // Without an RNG the dropout block is deterministic
        let mut cache = RuleCache::new();
        let y = block.forward(pair(&device), &mut cache, None).unwrap();
        for (g, e) in values(&y).iter().zip([1.5f32, 3.0, 4.5, 6.0]) {
            assert!((g - e).abs() < 1e-5, "{g} != {e}");
        }
    }
}
