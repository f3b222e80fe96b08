//! Actor-critic networks for the three algorithm families using Burn
//!
//! ```text
//! obs ─▶ FeatureExtractor ─▶ latent (MLP) ─▶ action head ─▶ mean action
//!                       └──▶ critic branch ─▶ value / Q
//! ```
//!
//! PPO shares one feature extractor between actor and critic and splits at
//! the MLP extractor. SAC and DDPG keep separate actor and critic extractors.
//! The export path only ever sees a policy through [`ActorPolicy`].

use burn::module::{AutodiffModule, Module, Param};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::activation::tanh;
use burn::tensor::backend::AutodiffBackend;

use super::algo::{
    AlgorithmKind, DdpgHyperparameters, Hyperparameters, PpoHyperparameters, SacHyperparameters,
};
use crate::schema::{self, ACTION_SIZE, Action, OBS_SIZE, Observation};

/// Clamp range for the SAC actor's state-dependent log std
pub const LOG_STD_MIN: f32 = -20.0;
pub const LOG_STD_MAX: f32 = 2.0;

const LOG_SQRT_2PI: f32 = 0.918_938_5;

/// Normalizes raw observations by the schema bounds:
/// `(obs - center) / half_range`.
#[derive(Module, Clone, Debug, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn features_dim(&self) -> usize {
        OBS_SIZE
    }

    /// Per-dimension center and reciprocal half range
    pub fn normalization(&self) -> (Observation, Observation) {
        let space = schema::observation_space();
        let center = space.center();
        let mut inv_half_range = space.half_range();
        for value in inv_half_range.iter_mut() {
            *value = if *value > 0.0 { 1.0 / *value } else { 1.0 };
        }
        (center, inv_half_range)
    }

    pub fn forward<B: Backend>(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = obs.device();
        let (center, inv_half_range) = self.normalization();
        let center = Tensor::<B, 1>::from_floats(center.as_slice(), &device).unsqueeze::<2>();
        let scale = Tensor::<B, 1>::from_floats(inv_half_range.as_slice(), &device).unsqueeze::<2>();
        (obs - center) * scale
    }
}

/// Stack of ReLU-activated linear layers
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
    activation: Relu,
}

impl<B: Backend> Mlp<B> {
    pub fn new(device: &B::Device, input_size: usize, hidden: &[usize]) -> Self {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut size = input_size;
        for &width in hidden {
            layers.push(LinearConfig::new(size, width).init(device));
            size = width;
        }

        Self {
            layers,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for layer in &self.layers {
            x = self.activation.forward(layer.forward(x));
        }
        x
    }

    pub fn layers(&self) -> &[Linear<B>] {
        &self.layers
    }

    fn soft_update(mut self, source: &Self, tau: f32) -> Self {
        self.layers = self
            .layers
            .into_iter()
            .zip(source.layers.iter())
            .map(|(target, source)| soft_update_linear(target, source, tau))
            .collect();
        self
    }
}

fn output_size(input_size: usize, hidden: &[usize]) -> usize {
    hidden.last().copied().unwrap_or(input_size)
}

/// Polyak averaging: `target <- (1 - tau) * target + tau * source`
fn soft_update_linear<B: Backend>(mut target: Linear<B>, source: &Linear<B>, tau: f32) -> Linear<B> {
    let weight = target.weight.val() * (1.0 - tau) + source.weight.val() * tau;
    target.weight = Param::from_tensor(weight.detach());
    target.bias = match (target.bias.take(), source.bias.as_ref()) {
        (Some(t), Some(s)) => {
            let bias = t.val() * (1.0 - tau) + s.val() * tau;
            Some(Param::from_tensor(bias.detach()))
        }
        (bias, _) => bias,
    };
    target
}

/// Separate policy and value branches on top of shared features
#[derive(Module, Debug)]
pub struct MlpExtractor<B: Backend> {
    pub policy_net: Mlp<B>,
    pub value_net: Mlp<B>,
}

impl<B: Backend> MlpExtractor<B> {
    pub fn new(device: &B::Device, features_dim: usize, pi: &[usize], vf: &[usize]) -> Self {
        Self {
            policy_net: Mlp::new(device, features_dim, pi),
            value_net: Mlp::new(device, features_dim, vf),
        }
    }

    /// Returns `(latent_pi, latent_vf)`
    pub fn forward(&self, features: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        (
            self.policy_net.forward(features.clone()),
            self.value_net.forward(features),
        )
    }

    pub fn forward_actor(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.policy_net.forward(features)
    }

    pub fn forward_critic(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.value_net.forward(features)
    }
}

/// Log density of a diagonal Gaussian, summed over action dimensions
pub fn gaussian_log_prob<B: Backend>(
    actions: Tensor<B, 2>,
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let var = (log_std.clone() * 2.0).exp();
    let log_prob = -((actions - mean).powf_scalar(2.0) / (var * 2.0)) - log_std - LOG_SQRT_2PI;
    log_prob.sum_dim(1).squeeze(1)
}

/// PPO actor-critic: diagonal Gaussian with state-independent log std
#[derive(Module, Debug)]
pub struct PpoPolicy<B: Backend> {
    pub features_extractor: FeatureExtractor,
    pub mlp_extractor: MlpExtractor<B>,
    /// Mean of the action distribution
    pub action_net: Linear<B>,
    pub value_net: Linear<B>,
    pub log_std: Param<Tensor<B, 1>>,
}

impl<B: Backend> PpoPolicy<B> {
    pub fn new(device: &B::Device, hp: &PpoHyperparameters) -> Self {
        let features_extractor = FeatureExtractor::new();
        let features_dim = features_extractor.features_dim();

        Self {
            mlp_extractor: MlpExtractor::new(device, features_dim, &hp.pi, &hp.vf),
            action_net: LinearConfig::new(output_size(features_dim, &hp.pi), ACTION_SIZE)
                .init(device),
            value_net: LinearConfig::new(output_size(features_dim, &hp.vf), 1).init(device),
            log_std: Param::from_tensor(Tensor::zeros([ACTION_SIZE], device)),
            features_extractor,
        }
    }

    /// Returns `(mean, log_std, value)`; log std broadcast to the batch
    pub fn forward(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 1>) {
        let features = self.features_extractor.forward(obs);
        let (latent_pi, latent_vf) = self.mlp_extractor.forward(features);
        let mean = self.action_net.forward(latent_pi);
        let log_std = mean.zeros_like() + self.log_std.val().unsqueeze::<2>();
        let value = self.value_net.forward(latent_vf).squeeze(1);
        (mean, log_std, value)
    }

    pub fn value(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        let features = self.features_extractor.forward(obs);
        let latent_vf = self.mlp_extractor.forward_critic(features);
        self.value_net.forward(latent_vf).squeeze(1)
    }

    /// Sample actions. Returns `(actions, log_prob, value)`.
    pub fn sample(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 1>, Tensor<B, 1>) {
        let (mean, log_std, value) = self.forward(obs);
        let noise = Tensor::random(mean.shape(), Distribution::Normal(0.0, 1.0), &mean.device());
        let actions = mean.clone() + log_std.clone().exp() * noise;
        let log_prob = gaussian_log_prob(actions.clone(), mean, log_std);
        (actions, log_prob, value)
    }

    /// Log prob, entropy and value for stored actions
    pub fn evaluate_actions(
        &self,
        obs: Tensor<B, 2>,
        actions: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Tensor<B, 1>, Tensor<B, 1>) {
        let (mean, log_std, value) = self.forward(obs);
        let log_prob = gaussian_log_prob(actions, mean, log_std.clone());
        let entropy = (log_std + (0.5 + LOG_SQRT_2PI)).sum_dim(1).squeeze(1);
        (log_prob, entropy, value)
    }
}

/// SAC actor: squashed Gaussian with state-dependent log std
#[derive(Module, Debug)]
pub struct SacActor<B: Backend> {
    pub features_extractor: FeatureExtractor,
    pub latent_pi: Mlp<B>,
    pub mu: Linear<B>,
    pub log_std: Linear<B>,
}

impl<B: Backend> SacActor<B> {
    pub fn new(device: &B::Device, hp: &SacHyperparameters) -> Self {
        let features_extractor = FeatureExtractor::new();
        let features_dim = features_extractor.features_dim();
        let latent_dim = output_size(features_dim, &hp.pi);

        Self {
            latent_pi: Mlp::new(device, features_dim, &hp.pi),
            mu: LinearConfig::new(latent_dim, ACTION_SIZE).init(device),
            log_std: LinearConfig::new(latent_dim, ACTION_SIZE).init(device),
            features_extractor,
        }
    }

    /// Returns `(mean, log_std)` of the pre-squash Gaussian
    pub fn action_dist(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = self.features_extractor.forward(obs);
        let latent = self.latent_pi.forward(features);
        let mean = self.mu.forward(latent.clone());
        let log_std = self.log_std.forward(latent).clamp(LOG_STD_MIN, LOG_STD_MAX);
        (mean, log_std)
    }

    /// Reparameterized sample in `[-1, 1]` with its tanh-corrected log prob
    pub fn sample(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let (mean, log_std) = self.action_dist(obs);
        let noise = Tensor::random(mean.shape(), Distribution::Normal(0.0, 1.0), &mean.device());
        let pre_squash = mean.clone() + log_std.clone().exp() * noise;
        let log_prob = gaussian_log_prob(pre_squash.clone(), mean, log_std);
        let actions = tanh(pre_squash);
        let correction = (actions.clone().powf_scalar(2.0).neg() + (1.0 + 1e-6))
            .log()
            .sum_dim(1)
            .squeeze(1);
        (actions, log_prob - correction)
    }

    /// Squashed mean in `[-1, 1]`
    pub fn deterministic(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let (mean, _) = self.action_dist(obs);
        tanh(mean)
    }
}

/// Deterministic DDPG actor with tanh output in `[-1, 1]`
#[derive(Module, Debug)]
pub struct DdpgActor<B: Backend> {
    pub features_extractor: FeatureExtractor,
    pub latent_pi: Mlp<B>,
    pub mu: Linear<B>,
}

impl<B: Backend> DdpgActor<B> {
    pub fn new(device: &B::Device, hp: &DdpgHyperparameters) -> Self {
        let features_extractor = FeatureExtractor::new();
        let features_dim = features_extractor.features_dim();

        Self {
            latent_pi: Mlp::new(device, features_dim, &hp.pi),
            mu: LinearConfig::new(output_size(features_dim, &hp.pi), ACTION_SIZE).init(device),
            features_extractor,
        }
    }

    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let features = self.features_extractor.forward(obs);
        tanh(self.mu.forward(self.latent_pi.forward(features)))
    }

    pub fn soft_update(mut self, source: &Self, tau: f32) -> Self {
        self.latent_pi = self.latent_pi.soft_update(&source.latent_pi, tau);
        self.mu = soft_update_linear(self.mu, &source.mu, tau);
        self
    }
}

/// Q(s, a) estimator
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    net: Mlp<B>,
    head: Linear<B>,
}

impl<B: Backend> QNetwork<B> {
    pub fn new(device: &B::Device, features_dim: usize, hidden: &[usize]) -> Self {
        let input = features_dim + ACTION_SIZE;
        Self {
            net: Mlp::new(device, input, hidden),
            head: LinearConfig::new(output_size(input, hidden), 1).init(device),
        }
    }

    pub fn forward(&self, features: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        let x = Tensor::cat(vec![features, actions], 1);
        self.head.forward(self.net.forward(x)).squeeze(1)
    }

    fn soft_update(mut self, source: &Self, tau: f32) -> Self {
        self.net = self.net.soft_update(&source.net, tau);
        self.head = soft_update_linear(self.head, &source.head, tau);
        self
    }
}

/// One or more Q networks behind a critic-only feature extractor
#[derive(Module, Debug)]
pub struct ContinuousCritic<B: Backend> {
    pub features_extractor: FeatureExtractor,
    pub q_networks: Vec<QNetwork<B>>,
}

impl<B: Backend> ContinuousCritic<B> {
    pub fn new(device: &B::Device, hidden: &[usize], n_critics: usize) -> Self {
        let features_extractor = FeatureExtractor::new();
        let features_dim = features_extractor.features_dim();
        Self {
            q_networks: (0..n_critics)
                .map(|_| QNetwork::new(device, features_dim, hidden))
                .collect(),
            features_extractor,
        }
    }

    /// Q values of every network, actions in `[-1, 1]` space
    pub fn forward(&self, obs: Tensor<B, 2>, actions: Tensor<B, 2>) -> Vec<Tensor<B, 1>> {
        let features = self.features_extractor.forward(obs);
        self.q_networks
            .iter()
            .map(|q| q.forward(features.clone(), actions.clone()))
            .collect()
    }

    /// Element-wise minimum over the Q networks
    pub fn min_q(&self, obs: Tensor<B, 2>, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = obs.dims();
        let device = obs.device();
        self.forward(obs, actions)
            .into_iter()
            .reduce(|acc, q| acc.min_pair(q))
            .unwrap_or_else(|| Tensor::zeros([batch], &device))
    }

    pub fn soft_update(mut self, source: &Self, tau: f32) -> Self {
        self.q_networks = self
            .q_networks
            .into_iter()
            .zip(source.q_networks.iter())
            .map(|(target, source)| target.soft_update(source, tau))
            .collect();
        self
    }
}

/// Learned entropy temperature, stored as `log(alpha)`
#[derive(Module, Debug)]
pub struct EntropyCoefficient<B: Backend> {
    pub log_alpha: Param<Tensor<B, 1>>,
}

impl<B: Backend> EntropyCoefficient<B> {
    pub fn new(device: &B::Device, initial: f32) -> Self {
        Self {
            log_alpha: Param::from_tensor(Tensor::from_floats([initial.ln()], device)),
        }
    }

    pub fn alpha(&self) -> Tensor<B, 1> {
        self.log_alpha.val().exp()
    }
}

/// Everything a SAC run persists
#[derive(Module, Debug)]
pub struct SacModel<B: Backend> {
    pub actor: SacActor<B>,
    pub critic: ContinuousCritic<B>,
    pub critic_target: ContinuousCritic<B>,
    pub entropy: EntropyCoefficient<B>,
}

impl<B: Backend> SacModel<B> {
    pub fn new(device: &B::Device, hp: &SacHyperparameters) -> Self {
        let critic = ContinuousCritic::new(device, &hp.qf, 2);
        Self {
            actor: SacActor::new(device, hp),
            critic_target: critic.clone(),
            critic,
            entropy: EntropyCoefficient::new(device, 1.0),
        }
    }
}

/// Everything a DDPG run persists
#[derive(Module, Debug)]
pub struct DdpgModel<B: Backend> {
    pub actor: DdpgActor<B>,
    pub actor_target: DdpgActor<B>,
    pub critic: ContinuousCritic<B>,
    pub critic_target: ContinuousCritic<B>,
}

impl<B: Backend> DdpgModel<B> {
    pub fn new(device: &B::Device, hp: &DdpgHyperparameters) -> Self {
        let actor = DdpgActor::new(device, hp);
        let critic = ContinuousCritic::new(device, &hp.qf, 1);
        Self {
            actor_target: actor.clone(),
            actor,
            critic_target: critic.clone(),
            critic,
        }
    }
}

/// Where the actor gets its features from
pub enum FeatureExtraction<'a> {
    /// One extractor feeds both actor and critic
    Shared(&'a FeatureExtractor),
    /// Actor and critic own independent extractors
    Split {
        actor: &'a FeatureExtractor,
        critic: &'a FeatureExtractor,
    },
}

/// How features become the actor's latent representation
pub enum LatentStage<'a, B: Backend> {
    /// Shared extractor that yields `(latent_pi, latent_vf)`
    Shared(&'a MlpExtractor<B>),
    /// Actor-only network
    ActorOnly(&'a Mlp<B>),
}

impl<B: Backend> LatentStage<'_, B> {
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            LatentStage::Shared(extractor) => extractor.forward(features).0,
            LatentStage::ActorOnly(net) => net.forward(features),
        }
    }
}

/// Latent → mean action
pub enum ActionHead<'a, B: Backend> {
    /// Unbounded Gaussian mean
    Gaussian(&'a Linear<B>),
    /// `tanh` squash followed by a rescale from `[-1, 1]` onto the action bounds
    Squashed(&'a Linear<B>),
}

impl<B: Backend> ActionHead<'_, B> {
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            ActionHead::Gaussian(linear) => linear.forward(latent),
            ActionHead::Squashed(linear) => {
                let squashed = tanh(linear.forward(latent));
                let device = squashed.device();
                let space = schema::action_space();
                let center =
                    Tensor::<B, 1>::from_floats(space.center().as_slice(), &device).unsqueeze::<2>();
                let half_range = Tensor::<B, 1>::from_floats(space.half_range().as_slice(), &device)
                    .unsqueeze::<2>();
                squashed * half_range + center
            }
        }
    }
}

/// The actor side of a trained policy, exposed structurally
pub trait ActorPolicy<B: Backend> {
    fn kind(&self) -> AlgorithmKind;
    fn feature_extraction(&self) -> FeatureExtraction<'_>;
    fn latent_stage(&self) -> LatentStage<'_, B>;
    fn action_head(&self) -> ActionHead<'_, B>;
}

impl<B: Backend> ActorPolicy<B> for PpoPolicy<B> {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Ppo
    }

    fn feature_extraction(&self) -> FeatureExtraction<'_> {
        FeatureExtraction::Shared(&self.features_extractor)
    }

    fn latent_stage(&self) -> LatentStage<'_, B> {
        LatentStage::Shared(&self.mlp_extractor)
    }

    fn action_head(&self) -> ActionHead<'_, B> {
        ActionHead::Gaussian(&self.action_net)
    }
}

impl<B: Backend> ActorPolicy<B> for SacModel<B> {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Sac
    }

    fn feature_extraction(&self) -> FeatureExtraction<'_> {
        FeatureExtraction::Split {
            actor: &self.actor.features_extractor,
            critic: &self.critic.features_extractor,
        }
    }

    fn latent_stage(&self) -> LatentStage<'_, B> {
        LatentStage::ActorOnly(&self.actor.latent_pi)
    }

    fn action_head(&self) -> ActionHead<'_, B> {
        ActionHead::Squashed(&self.actor.mu)
    }
}

impl<B: Backend> ActorPolicy<B> for DdpgModel<B> {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Ddpg
    }

    fn feature_extraction(&self) -> FeatureExtraction<'_> {
        FeatureExtraction::Split {
            actor: &self.actor.features_extractor,
            critic: &self.critic.features_extractor,
        }
    }

    fn latent_stage(&self) -> LatentStage<'_, B> {
        LatentStage::ActorOnly(&self.actor.latent_pi)
    }

    fn action_head(&self) -> ActionHead<'_, B> {
        ActionHead::Squashed(&self.actor.mu)
    }
}

/// A complete model of one of the supported families
#[derive(Debug, Clone)]
pub enum PolicyModel<B: Backend> {
    Ppo(PpoPolicy<B>),
    Sac(SacModel<B>),
    Ddpg(DdpgModel<B>),
}

impl<B: Backend> PolicyModel<B> {
    /// Freshly initialized model for the given hyperparameters
    pub fn init(hp: &Hyperparameters, device: &B::Device) -> Self {
        match hp {
            Hyperparameters::Ppo(hp) => PolicyModel::Ppo(PpoPolicy::new(device, hp)),
            Hyperparameters::Sac(hp) => PolicyModel::Sac(SacModel::new(device, hp)),
            Hyperparameters::Ddpg(hp) => PolicyModel::Ddpg(DdpgModel::new(device, hp)),
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.actor().kind()
    }

    pub fn actor(&self) -> &dyn ActorPolicy<B> {
        match self {
            PolicyModel::Ppo(policy) => policy,
            PolicyModel::Sac(model) => model,
            PolicyModel::Ddpg(model) => model,
        }
    }

    /// Input width of the actor's first layer and output width of its head
    pub fn actor_io_dims(&self) -> (usize, usize) {
        let actor = self.actor();
        let first = match actor.latent_stage() {
            LatentStage::Shared(extractor) => extractor.policy_net.layers().first().cloned(),
            LatentStage::ActorOnly(net) => net.layers().first().cloned(),
        };
        let head = match actor.action_head() {
            ActionHead::Gaussian(linear) | ActionHead::Squashed(linear) => linear.clone(),
        };
        let [head_in, head_out] = head.weight.val().dims();
        let input = first.map(|l| l.weight.val().dims()[0]).unwrap_or(head_in);
        (input, head_out)
    }

    pub fn num_params(&self) -> usize {
        match self {
            PolicyModel::Ppo(policy) => policy.num_params(),
            PolicyModel::Sac(model) => model.num_params(),
            PolicyModel::Ddpg(model) => model.num_params(),
        }
    }
}

impl<B: AutodiffBackend> PolicyModel<B> {
    /// Copy without autodiff tracking
    pub fn valid(&self) -> PolicyModel<B::InnerBackend> {
        match self {
            PolicyModel::Ppo(policy) => PolicyModel::Ppo(policy.valid()),
            PolicyModel::Sac(model) => PolicyModel::Sac(model.valid()),
            PolicyModel::Ddpg(model) => PolicyModel::Ddpg(model.valid()),
        }
    }
}

// Helper functions for tensor conversion

pub fn rows_to_tensor<B: Backend, const N: usize>(
    rows: &[[f32; N]],
    device: &B::Device,
) -> Tensor<B, 2> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([rows.len(), N])
}

pub fn tensor_to_rows<B: Backend, const N: usize>(
    tensor: Tensor<B, 2>,
) -> Result<Vec<[f32; N]>, String> {
    let [_, width] = tensor.dims();
    if width != N {
        return Err(format!("expected {} columns, got {}", N, width));
    }
    let flat = tensor_to_vec(tensor)?;
    Ok(flat
        .chunks_exact(N)
        .map(|chunk| {
            let mut row = [0.0f32; N];
            row.copy_from_slice(chunk);
            row
        })
        .collect())
}

pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, String> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| format!("{:?}", e))
}

/// `[1, OBS_SIZE]` batch holding one observation
pub fn single_row<B: Backend>(obs: &Observation, device: &B::Device) -> Tensor<B, 2> {
    rows_to_tensor::<B, OBS_SIZE>(std::slice::from_ref(obs), device)
}

pub fn first_action(rows: Vec<Action>) -> Action {
    rows.into_iter().next().unwrap_or([0.0; ACTION_SIZE])
}
