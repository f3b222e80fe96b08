//! Deterministic actor view of a trained policy
//!
//! Evaluation and export both need the same computation: normalize the
//! observation, run the actor's latent network and apply the action head
//! without sampling. [`DeterministicPolicy`] performs it on tensors and
//! [`DeterministicPolicy::trace`] emits the equivalent ONNX graph.

use burn::nn::Linear;
use burn::prelude::*;

use super::ExportError;
use super::graph::GraphBuilder;
use super::onnx::{INPUT_NAME, ModelProto};
use crate::rl::policy::{
    ActionHead, ActorPolicy, FeatureExtraction, FeatureExtractor, LatentStage, first_action,
    single_row, tensor_to_rows, tensor_to_vec,
};
use crate::rl::AlgorithmKind;
use crate::schema::{self, ACTION_SIZE, Action, OBS_SIZE, Observation};

pub struct DeterministicPolicy<'a, B: Backend> {
    policy: &'a dyn ActorPolicy<B>,
}

impl<'a, B: Backend> DeterministicPolicy<'a, B> {
    pub fn new(policy: &'a dyn ActorPolicy<B>) -> Self {
        Self { policy }
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.policy.kind()
    }

    fn actor_features(&self) -> &'a FeatureExtractor {
        match self.policy.feature_extraction() {
            FeatureExtraction::Shared(extractor) => extractor,
            FeatureExtraction::Split { actor, .. } => actor,
        }
    }

    /// `[batch, OBS_SIZE]` observations to `[batch, ACTION_SIZE]` mean actions
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let features = self.actor_features().forward(obs);
        let latent = self.policy.latent_stage().forward(features);
        self.policy.action_head().forward(latent)
    }

    pub fn act(&self, obs: &Observation, device: &B::Device) -> Result<Action, String> {
        let actions = self.forward(single_row::<B>(obs, device));
        Ok(first_action(tensor_to_rows::<B, ACTION_SIZE>(actions)?))
    }

    /// Emit the forward pass as an ONNX graph with `obs` in and `action` out
    pub fn trace(&self, opset: i64) -> Result<ModelProto, ExportError> {
        let mut builder = GraphBuilder::new();

        let (center, inv_half_range) = self.actor_features().normalization();
        let center = builder.initializer("obs_center", &[1, OBS_SIZE], &center);
        let scale = builder.initializer("obs_scale", &[1, OBS_SIZE], &inv_half_range);
        let shifted = builder.node("Sub", &[INPUT_NAME, &center], Vec::new());
        let mut x = builder.node("Mul", &[&shifted, &scale], Vec::new());

        let hidden = match self.policy.latent_stage() {
            LatentStage::Shared(extractor) => extractor.policy_net.layers().to_vec(),
            LatentStage::ActorOnly(net) => net.layers().to_vec(),
        };
        for layer in &hidden {
            let z = gemm(&mut builder, &x, layer)?;
            x = builder.node("Relu", &[&z], Vec::new());
        }

        let output = match self.policy.action_head() {
            ActionHead::Gaussian(linear) => gemm(&mut builder, &x, linear)?,
            ActionHead::Squashed(linear) => {
                let z = gemm(&mut builder, &x, linear)?;
                let squashed = builder.node("Tanh", &[&z], Vec::new());
                let space = schema::action_space();
                let half_range =
                    builder.initializer("action_half_range", &[1, ACTION_SIZE], &space.half_range());
                let center = builder.initializer("action_center", &[1, ACTION_SIZE], &space.center());
                let scaled = builder.node("Mul", &[&squashed, &half_range], Vec::new());
                builder.node("Add", &[&scaled, &center], Vec::new())
            }
        };

        let metadata = [
            ("algorithm", self.kind().name().to_string()),
            ("obs_size", OBS_SIZE.to_string()),
            ("action_size", ACTION_SIZE.to_string()),
        ];
        Ok(builder.finish(&output, opset, &metadata)?)
    }
}

/// `x @ W + b` with `W` stored `[in, out]`
fn gemm<B: Backend>(
    builder: &mut GraphBuilder,
    x: &str,
    layer: &Linear<B>,
) -> Result<String, ExportError> {
    let weight = layer.weight.val();
    let [d_input, d_output] = weight.dims();
    let weight = tensor_to_vec(weight).map_err(ExportError::Trace)?;
    let bias = match &layer.bias {
        Some(bias) => tensor_to_vec(bias.val()).map_err(ExportError::Trace)?,
        None => vec![0.0; d_output],
    };

    let w = builder.initializer("weight", &[d_input, d_output], &weight);
    let b = builder.initializer("bias", &[d_output], &bias);
    Ok(builder.node("Gemm", &[x, &w, &b], Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::graph::PortableGraph;
    use crate::rl::algo::AlgorithmKind;
    use crate::rl::backend::{InferenceBackend, default_device};
    use crate::rl::policy::{PolicyModel, rows_to_tensor};

    type B = InferenceBackend;

    fn model(kind: AlgorithmKind) -> PolicyModel<B> {
        PolicyModel::init(&kind.hyperparameters(), &default_device())
    }

    #[test]
    fn test_sac_actions_within_bounds() {
        let device = default_device();
        let model = model(AlgorithmKind::Sac);
        let policy = DeterministicPolicy::new(model.actor());
        let space = schema::observation_space();
        let obs = [space.low, space.high, space.center()];
        let rows = tensor_to_rows::<B, ACTION_SIZE>(
            policy.forward(rows_to_tensor::<B, OBS_SIZE>(&obs, &device)),
        )
        .unwrap();
        for action in rows {
            assert!(schema::action_space().contains(&action));
        }
    }

    #[test]
    fn test_trace_matches_forward() {
        let device = default_device();
        for kind in AlgorithmKind::TRIAL_ORDER {
            let model = model(kind);
            let policy = DeterministicPolicy::new(model.actor());
            let graph = PortableGraph::from_model(policy.trace(14).unwrap()).unwrap();
            graph.check_contract().unwrap();

            let obs = schema::observation_space().center();
            let expected = policy.act(&obs, &device).unwrap();
            let actual = graph.infer(&obs).unwrap();
            for (e, a) in expected.iter().zip(actual.iter()) {
                assert!((e - a).abs() < 1e-4, "{}: {} vs {}", kind, e, a);
            }
        }
    }

    #[test]
    fn test_trace_uses_only_supported_ops() {
        let model = model(AlgorithmKind::Ppo);
        let policy = DeterministicPolicy::new(model.actor());
        let proto = policy.trace(14).unwrap();
        let graph = proto.graph.unwrap();
        for node in &graph.node {
            assert!(
                ["Sub", "Mul", "Gemm", "Relu", "Tanh", "Add"].contains(&node.op_type.as_str()),
                "unexpected {}",
                node.op_type
            );
        }
        assert!(!graph.node.iter().any(|n| n.op_type == "Tanh"));
    }
}
