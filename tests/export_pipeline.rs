use std::path::{Path, PathBuf};

use boostrap_bot::export::graph::Dim;
use boostrap_bot::export::{
    self, DEFAULT_OPSET, DeterministicPolicy, ExportError, INPUT_NAME, OUTPUT_NAME, PortableGraph,
};
use boostrap_bot::rl::checkpoint::{self, CheckpointMeta};
use boostrap_bot::rl::policy::{rows_to_tensor, tensor_to_vec};
use boostrap_bot::rl::{AlgorithmKind, InferenceBackend, PolicyModel, default_device};
use boostrap_bot::schema::{self, ACTION_SIZE, OBS_SIZE};
use tempfile::TempDir;

type B = InferenceBackend;

fn save_fresh(dir: &Path, kind: AlgorithmKind) -> (PolicyModel<B>, PathBuf) {
    let hp = kind.hyperparameters();
    let model = PolicyModel::<B>::init(&hp, &default_device());
    let meta = CheckpointMeta::new(hp, 0, Some(7));
    let weights = checkpoint::save(&model, &meta, &dir.join(kind.file_prefix())).unwrap();
    (model, weights)
}

#[test]
fn test_export_each_kind_has_obs_action_contract() {
    let dir = TempDir::new().unwrap();
    for kind in AlgorithmKind::TRIAL_ORDER {
        let (_, weights) = save_fresh(dir.path(), kind);
        let output = dir.path().join(format!("{}.onnx", kind.file_prefix()));

        let written = export::export_policy_to_onnx(&weights, &output, DEFAULT_OPSET).unwrap();
        assert_eq!(written, output);

        let graph = PortableGraph::load(&output).unwrap();
        graph.check_contract().unwrap();
        assert_eq!(graph.opset(), Some(DEFAULT_OPSET));
        assert_eq!(graph.metadata("algorithm"), Some(kind.name()));

        let input = &graph.inputs()[0];
        assert_eq!(input.name, INPUT_NAME);
        assert!(matches!(input.dims[0], Dim::Dynamic(_)));
        assert_eq!(input.dims[1], Dim::Fixed(OBS_SIZE));

        let output = &graph.outputs()[0];
        assert_eq!(output.name, OUTPUT_NAME);
        assert!(matches!(output.dims[0], Dim::Dynamic(_)));
        assert_eq!(output.dims[1], Dim::Fixed(ACTION_SIZE));
    }
}

#[test]
fn test_exported_graph_matches_policy_on_a_batch() {
    let dir = TempDir::new().unwrap();
    let device = default_device();
    let (model, weights) = save_fresh(dir.path(), AlgorithmKind::Sac);
    let output = dir.path().join("sac.onnx");
    export::export_policy_to_onnx(&weights, &output, 17).unwrap();

    let space = schema::observation_space();
    let obs = [space.low, space.center(), space.high];
    let policy = DeterministicPolicy::new(model.actor());
    let expected =
        tensor_to_vec(policy.forward(rows_to_tensor::<B, OBS_SIZE>(&obs, &device))).unwrap();

    let flat: Vec<f32> = obs.iter().flatten().copied().collect();
    let graph = PortableGraph::load(&output).unwrap();
    assert_eq!(graph.model().ir_version, 8);
    let actual = graph.run(&flat, obs.len()).unwrap();
    assert_eq!(actual.len(), obs.len() * ACTION_SIZE);
    for (e, a) in expected.iter().zip(actual.iter()) {
        assert!((e - a).abs() < 1e-4, "{} vs {}", e, a);
    }
}

#[test]
fn test_deterministic_policy_is_bit_identical() {
    let device = default_device();
    for kind in AlgorithmKind::TRIAL_ORDER {
        let model = PolicyModel::<B>::init(&kind.hyperparameters(), &device);
        let policy = DeterministicPolicy::new(model.actor());
        let obs = schema::observation_space().center();
        let first = policy.act(&obs, &device).unwrap();
        for _ in 0..5 {
            let again = policy.act(&obs, &device).unwrap();
            assert_eq!(
                first.map(f32::to_bits),
                again.map(f32::to_bits),
                "{} wrapper is not deterministic",
                kind
            );
        }
    }
}

#[test]
fn test_zero_probe_is_finite() {
    let device = default_device();
    for kind in AlgorithmKind::TRIAL_ORDER {
        let model = PolicyModel::<B>::init(&kind.hyperparameters(), &device);
        let policy = DeterministicPolicy::new(model.actor());
        let action = policy.forward(burn::tensor::Tensor::zeros([1, OBS_SIZE], &device));
        assert_eq!(action.dims(), [1, ACTION_SIZE]);
        let values = tensor_to_vec(action).unwrap();
        assert!(values.iter().all(|v| v.is_finite()), "{}: {:?}", kind, values);
    }
}

#[test]
fn test_missing_checkpoint_is_not_found() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("policy.onnx");
    let result = export::export_policy_to_onnx(&dir.path().join("nope.mpk"), &output, 14);
    assert!(matches!(result, Err(ExportError::CheckpointNotFound(_))));
    assert!(!output.exists());
}

#[test]
fn test_garbage_checkpoint_is_unrecognized() {
    let dir = TempDir::new().unwrap();
    let model = dir.path().join("garbage.mpk");
    std::fs::write(&model, b"definitely not a model").unwrap();
    let output = dir.path().join("policy.onnx");

    let err = export::export_policy_to_onnx(&model, &output, 14).unwrap_err();
    match &err {
        ExportError::UnrecognizedModel { path, attempted } => {
            assert_eq!(path, &model);
            assert_eq!(attempted, &AlgorithmKind::TRIAL_ORDER.to_vec());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().contains("garbage.mpk"));
    assert!(!output.exists());
}

#[test]
fn test_untagged_checkpoint_is_identified_by_trial_loading() {
    let dir = TempDir::new().unwrap();
    let (_, weights) = save_fresh(dir.path(), AlgorithmKind::Ddpg);
    std::fs::remove_file(checkpoint::meta_path(&weights)).unwrap();

    let output = dir.path().join("ddpg.onnx");
    export::export_policy_to_onnx(&weights, &output, 14).unwrap();
    let graph = PortableGraph::load(&output).unwrap();
    assert_eq!(graph.metadata("algorithm"), Some("DDPG"));
}

#[test]
fn test_export_overwrites_existing_output() {
    let dir = TempDir::new().unwrap();
    let (_, weights) = save_fresh(dir.path(), AlgorithmKind::Ppo);
    let output = dir.path().join("policy.onnx");
    std::fs::write(&output, b"stale").unwrap();

    export::export_policy_to_onnx(&weights, &output, 14).unwrap();
    PortableGraph::load(&output).unwrap().check_contract().unwrap();
}

#[test]
fn test_stem_path_resolves_to_weights() {
    let dir = TempDir::new().unwrap();
    save_fresh(dir.path(), AlgorithmKind::Ppo);
    let output = dir.path().join("policy.onnx");
    export::export_policy_to_onnx(&dir.path().join("ppo"), &output, 14).unwrap();
    assert!(output.is_file());
}

#[test]
fn test_unsupported_opset_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let (_, weights) = save_fresh(dir.path(), AlgorithmKind::Ppo);
    let output = dir.path().join("policy.onnx");
    let result = export::export_policy_to_onnx(&weights, &output, 5);
    assert!(matches!(result, Err(ExportError::UnsupportedOpset(5))));
    assert!(!output.exists());
}

#[test]
fn test_failed_export_leaves_existing_output_untouched() {
    let dir = TempDir::new().unwrap();
    let (_, weights) = save_fresh(dir.path(), AlgorithmKind::Sac);
    let garbage = dir.path().join("garbage.mpk");
    std::fs::write(&garbage, b"definitely not a model").unwrap();
    let output = dir.path().join("policy.onnx");
    let tmp = dir.path().join("policy.onnx.tmp");
    std::fs::write(&output, b"previous export").unwrap();

    let unrecognized = export::export_policy_to_onnx(&garbage, &output, 14);
    assert!(matches!(unrecognized, Err(ExportError::UnrecognizedModel { .. })));
    assert_eq!(std::fs::read(&output).unwrap(), b"previous export");
    assert!(!tmp.exists());

    let bad_opset = export::export_policy_to_onnx(&weights, &output, 99);
    assert!(matches!(bad_opset, Err(ExportError::UnsupportedOpset(99))));
    assert_eq!(std::fs::read(&output).unwrap(), b"previous export");
    assert!(!tmp.exists());
}

#[test]
fn test_infer_pads_and_truncates_observations() {
    let dir = TempDir::new().unwrap();
    let (_, weights) = save_fresh(dir.path(), AlgorithmKind::Ppo);
    let output = dir.path().join("policy.onnx");
    export::export_policy_to_onnx(&weights, &output, 14).unwrap();
    let graph = PortableGraph::load(&output).unwrap();

    let mut full = [0.0f32; OBS_SIZE];
    full[..3].copy_from_slice(&[100.0, -50.0, 20.0]);
    let expected = graph.infer(&full).unwrap();
    assert_eq!(graph.infer(&full[..3]).unwrap(), expected);

    let mut long = full.to_vec();
    long.extend_from_slice(&[9.0; 8]);
    assert_eq!(graph.infer(&long).unwrap(), expected);
}
