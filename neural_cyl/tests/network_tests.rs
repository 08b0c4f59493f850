//! End-to-end tests of the segmentation network.

use burn::backend::NdArray;
use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use neural_cyl::{
    network::gaussian_centre_scores, predict::point_labels, Asymm3dConfig, Asymm3dSpconv,
    NeuralCylError, SparseTensor, VoxelCoord, WeightInit,
};

type TestBackend = NdArray;

fn coords_tensor(coords: &[VoxelCoord], device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2, Int> {
    let data: Vec<i64> = coords
        .iter()
        .flat_map(|c| c.as_array())
        .map(i64::from)
        .collect();
    Tensor::from_data(TensorData::new(data, [coords.len(), 4]), device)
}

/// 100 distinct voxels spread over a full-size cylindrical grid
fn lidar_scan() -> Vec<VoxelCoord> {
    (0..100)
        .map(|i| VoxelCoord::new(0, (i * 37) % 480, (i * 53) % 360, i % 32))
        .collect()
}

fn small_net(device: &<TestBackend as Backend>::Device) -> Asymm3dSpconv<TestBackend> {
    Asymm3dConfig::new([16, 16, 8])
        .with_num_input_features(4)
        .with_num_classes(3)
        .with_init_size(2)
        .init(device)
        .unwrap()
}

/// Two batch slots of 24 voxels each with varied features
fn small_input(
    net: &Asymm3dSpconv<TestBackend>,
    device: &<TestBackend as Backend>::Device,
) -> SparseTensor<TestBackend> {
    let coords: Vec<VoxelCoord> = (0..48)
        .map(|i| {
            let j = i % 24;
            VoxelCoord::new(i / 24, j % 16, (j * 3) % 16, j / 16)
        })
        .collect();
    let values: Vec<f32> = (0..48 * 4).map(|v| ((v % 11) as f32 - 5.0) / 5.0).collect();
    let features = Tensor::from_data(TensorData::new(values, [48, 4]), device);
    net.prepare_voxels(features, coords, 2).unwrap()
}

fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
    t.into_data().to_vec().unwrap()
}

#[test]
fn test_full_grid_scores_only_active_voxels() {
    let device = Default::default();
    let net = Asymm3dConfig::new([480, 360, 32])
        .with_num_input_features(9)
        .with_num_classes(2)
        .with_init_size(4)
        .with_weight_init(WeightInit::CenterIdentity)
        .init::<TestBackend>(&device)
        .unwrap();

    let coords = lidar_scan();
    let features = Tensor::<TestBackend, 2>::ones([coords.len(), 9], &device);
    let out = net
        .forward(features, coords_tensor(&coords, &device), 1)
        .unwrap();
    assert_eq!(out.dims(), [1, 2, 480, 360, 32]);

    let values = to_vec(out);
    let volume = 480 * 360 * 32;
    for c in &coords {
        let cell = (c.z as usize * 360 + c.y as usize) * 32 + c.x as usize;
        assert!(values[cell] > 0.0, "class 0 at {c}");
        assert!(values[volume + cell] > 0.0, "class 1 at {c}");
    }
    let nonzero = values.iter().filter(|&&v| v != 0.0).count();
    assert_eq!(nonzero, 2 * coords.len());
}

#[test]
fn test_identical_passes_are_identical() {
    let device = Default::default();
    let net = small_net(&device);

    let a = to_vec(net.forward_sparse(small_input(&net, &device)).unwrap());
    let b = to_vec(net.forward_sparse(small_input(&net, &device)).unwrap());
    assert_eq!(a, b);
}

#[test]
fn test_dropout_follows_the_seed() {
    let device = Default::default();
    let net = small_net(&device);

    let run = |seed: u64| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        to_vec(net.forward_dropout(small_input(&net, &device), &mut rng).unwrap())
    };

    let a = run(11);
    assert_eq!(a, run(11));
    assert_ne!(a, run(12));
}

#[test]
fn test_ensemble_stacks_passes() {
    let device = Default::default();
    let net = small_net(&device);

    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let ensemble = net
        .forward_dropout_ensemble(small_input(&net, &device), 3, &mut rng)
        .unwrap();
    assert_eq!(ensemble.dims(), [6, 3, 16, 16, 8]);

    // The first pass draws the same masks as a single dropout pass
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let single = net
        .forward_dropout(small_input(&net, &device), &mut rng)
        .unwrap();
    let first = ensemble.slice([0..2, 0..3, 0..16, 0..16, 0..8]);
    let (first, single) = (to_vec(first), to_vec(single));
    for (a, b) in first.iter().zip(&single) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_gaussian_centre_head() {
    let device = Default::default();
    let net = Asymm3dConfig::new([16, 16, 8])
        .with_num_input_features(4)
        .with_num_classes(3)
        .with_init_size(2)
        .with_dml_magnitude(2.0)
        .init::<TestBackend>(&device)
        .unwrap();

    let input = small_input(&net, &device);
    let active = input.clone();
    let dml = net.forward_dml(input.clone()).unwrap();
    let expected = gaussian_centre_scores(net.forward_sparse(input).unwrap(), 2.0);
    assert_eq!(dml.dims(), [2, 3, 16, 16, 8]);

    let (got, expected) = (to_vec(dml.clone()), to_vec(expected));
    for (a, b) in got.iter().zip(&expected) {
        assert!((a - b).abs() < 1e-4);
    }

    // Empty cells sit at distance magnitude from every centre
    let cell = |b: usize, z: usize, y: usize, x: usize| ((b * 3 * 16 + z) * 16 + y) * 8 + x;
    let empty = (0..16)
        .flat_map(|z| (0..16).map(move |y| (z, y)))
        .find(|&(z, y)| {
            !active
                .coords()
                .iter()
                .any(|c| c.batch == 0 && c.z == z as i32 && c.y == y as i32)
        })
        .unwrap();
    assert!((got[cell(0, empty.0, empty.1, 0)] + 4.0).abs() < 1e-6);
}

#[test]
fn test_open_set_head() {
    let device = Default::default();
    let net = Asymm3dConfig::new([16, 16, 8])
        .with_num_input_features(4)
        .with_num_classes(3)
        .with_init_size(2)
        .with_aux_classes(Some(5))
        .init::<TestBackend>(&device)
        .unwrap();

    let input = small_input(&net, &device);
    let open = net.forward_open_set(input.clone()).unwrap();
    assert_eq!(open.dims(), [2, 4, 16, 16, 8]);

    // The known-class channels match the plain forward pass
    let known = to_vec(open.slice([0..2, 0..3, 0..16, 0..16, 0..8]));
    let plain = to_vec(net.forward_sparse(input).unwrap());
    for (a, b) in known.iter().zip(&plain) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_lenient_and_strict_inputs() {
    let device = Default::default();
    let mut coords = lidar_scan();
    coords.truncate(10);
    coords.push(VoxelCoord::new(0, -1, 0, 0));
    coords.push(VoxelCoord::new(3, 1, 1, 1));
    let features = Tensor::<TestBackend, 2>::ones([coords.len(), 9], &device);

    let config = Asymm3dConfig::new([480, 360, 32])
        .with_num_input_features(9)
        .with_num_classes(2)
        .with_init_size(2);

    let lenient = config.init::<TestBackend>(&device).unwrap();
    let input = lenient
        .prepare_input(features.clone(), coords_tensor(&coords, &device), 1)
        .unwrap();
    assert_eq!(input.len(), 10);

    let strict = config.with_strict(true).init::<TestBackend>(&device).unwrap();
    let err = strict
        .forward(features, coords_tensor(&coords, &device), 1)
        .unwrap_err();
    assert!(err.is_shape_mismatch());
}

#[test]
fn test_duplicate_voxels_are_fatal() {
    let device = Default::default();
    let net = small_net(&device);
    let coords = vec![VoxelCoord::new(0, 1, 1, 1), VoxelCoord::new(0, 1, 1, 1)];
    let features = Tensor::<TestBackend, 2>::ones([2, 4], &device);

    let err = net.prepare_voxels(features, coords, 1).unwrap_err();
    assert!(matches!(err, NeuralCylError::Index(_)));
    assert!(err.is_shape_mismatch());
}

#[test]
fn test_point_labels_from_scores() {
    let device = Default::default();
    let net = small_net(&device);
    let input = small_input(&net, &device);
    let voxels = input.coords().to_vec();

    let scores = net.forward_sparse(input.clone()).unwrap();
    let labels = point_labels(scores.clone(), &voxels).unwrap();
    assert_eq!(labels.len(), voxels.len());
    assert!(labels.iter().all(|&l| l < 3));

    // Labels agree with an argmax over the gathered active rows
    let rows = input.gather_dense(scores).unwrap();
    let rows = to_vec(rows);
    for (label, row) in labels.iter().zip(rows.chunks_exact(3)) {
        assert!(row.iter().all(|&v| v <= row[*label]));
    }
}
