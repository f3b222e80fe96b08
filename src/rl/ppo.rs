//! PPO learner: vectorized rollouts, GAE, clipped surrogate updates

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::algo::{AlgorithmKind, Hyperparameters, PpoHyperparameters};
use super::buffer::RolloutBuffer;
use super::env::VecEnv;
use super::metrics::TrainingMetrics;
use super::policy::{PolicyModel, PpoPolicy, rows_to_tensor, tensor_to_rows, tensor_to_vec};
use super::train::{Learner, TrainError};
use crate::schema::{self, ACTION_SIZE, OBS_SIZE, Observation};

pub struct PpoLearner<B: AutodiffBackend> {
    policy: PpoPolicy<B>,
    optim: OptimizerAdaptor<Adam, PpoPolicy<B>, B>,
    hp: PpoHyperparameters,
    buffer: RolloutBuffer,
    last_obs: Option<Vec<Observation>>,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> PpoLearner<B> {
    pub fn new(policy: PpoPolicy<B>, hp: PpoHyperparameters, seed: u64, device: B::Device) -> Self {
        let optim = AdamConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(hp.max_grad_norm)))
            .init();

        Self {
            policy,
            optim,
            hp,
            buffer: RolloutBuffer::new(),
            last_obs: None,
            rng: StdRng::seed_from_u64(seed),
            device,
        }
    }

    pub fn policy(&self) -> &PpoPolicy<B> {
        &self.policy
    }

    /// Collect `n_steps` transitions from every env
    fn collect_rollout(
        &mut self,
        envs: &mut VecEnv,
        metrics: &mut TrainingMetrics,
    ) -> Result<Vec<f32>, TrainError> {
        self.buffer.clear();

        let policy = self.policy.valid();
        let mut obs = match self.last_obs.take() {
            Some(obs) => obs,
            None => envs.reset_all(),
        };

        for _ in 0..self.hp.n_steps {
            let obs_tensor = rows_to_tensor::<B::InnerBackend, OBS_SIZE>(&obs, &self.device);
            let (actions, log_probs, values) = policy.sample(obs_tensor);

            let actions = tensor_to_rows::<_, ACTION_SIZE>(actions).map_err(TrainError::Tensor)?;
            let log_probs = tensor_to_vec(log_probs).map_err(TrainError::Tensor)?;
            let values = tensor_to_vec(values).map_err(TrainError::Tensor)?;

            // The env sees actions clipped to the bounds; the buffer keeps
            // the sampled ones so log probs stay consistent.
            let space = schema::action_space();
            let clipped: Vec<_> = actions.iter().map(|a| space.clip(a)).collect();
            let results = envs.step_all(&clipped);
            metrics.track_steps(&results);

            self.buffer.push(
                obs,
                actions,
                log_probs,
                results.iter().map(|r| r.reward).collect(),
                results.iter().map(|r| r.done()).collect(),
                values,
            );

            obs = results.into_iter().map(|r| r.observation).collect();
        }

        let obs_tensor = rows_to_tensor::<B::InnerBackend, OBS_SIZE>(&obs, &self.device);
        let last_values = tensor_to_vec(policy.value(obs_tensor)).map_err(TrainError::Tensor)?;
        self.last_obs = Some(obs);
        Ok(last_values)
    }

    /// Perform PPO update on collected rollout
    fn update(&mut self, last_values: &[f32], metrics: &mut TrainingMetrics) {
        let (returns, advantages) =
            self.buffer
                .compute_returns_and_advantages(last_values, self.hp.gamma, self.hp.gae_lambda);
        let observations = self.buffer.flat_observations();
        let actions = self.buffer.flat_actions();
        let old_log_probs = self.buffer.flat_log_probs();

        let mut indices: Vec<usize> = (0..returns.len()).collect();
        let batch_size = self.hp.batch_size.max(1);

        for _ in 0..self.hp.n_epochs {
            indices.shuffle(&mut self.rng);

            for batch_indices in indices.chunks(batch_size) {
                let batch_obs: Vec<_> = batch_indices.iter().map(|&i| observations[i]).collect();
                let batch_actions: Vec<_> = batch_indices.iter().map(|&i| actions[i]).collect();
                let batch_old_log_probs: Vec<f32> =
                    batch_indices.iter().map(|&i| old_log_probs[i]).collect();
                let batch_returns: Vec<f32> = batch_indices.iter().map(|&i| returns[i]).collect();
                let batch_advantages =
                    normalize(batch_indices.iter().map(|&i| advantages[i]).collect());

                let obs_tensor = rows_to_tensor::<B, OBS_SIZE>(&batch_obs, &self.device);
                let actions_tensor = rows_to_tensor::<B, ACTION_SIZE>(&batch_actions, &self.device);
                let old_log_probs_tensor =
                    Tensor::<B, 1>::from_floats(batch_old_log_probs.as_slice(), &self.device);
                let returns_tensor =
                    Tensor::<B, 1>::from_floats(batch_returns.as_slice(), &self.device);
                let advantages_tensor =
                    Tensor::<B, 1>::from_floats(batch_advantages.as_slice(), &self.device);

                let (log_probs, entropy, values) =
                    self.policy.evaluate_actions(obs_tensor, actions_tensor);

                // PPO clipped objective
                let ratio = (log_probs - old_log_probs_tensor).exp();
                let clipped_ratio = ratio
                    .clone()
                    .clamp(1.0 - self.hp.clip_range, 1.0 + self.hp.clip_range);
                let surr1 = ratio * advantages_tensor.clone();
                let surr2 = clipped_ratio * advantages_tensor;
                let policy_loss = -surr1.min_pair(surr2).mean();

                let value_loss = (values - returns_tensor).powf_scalar(2.0).mean();
                let entropy_mean = entropy.mean();

                let loss = policy_loss.clone() + value_loss.clone() * self.hp.vf_coef
                    - entropy_mean.clone() * self.hp.ent_coef;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &self.policy);
                self.policy = self
                    .optim
                    .step(self.hp.learning_rate, self.policy.clone(), grads);

                metrics.record_loss("policy", policy_loss.into_scalar().elem::<f32>());
                metrics.record_loss("value", value_loss.into_scalar().elem::<f32>());
                metrics.record_loss("entropy", entropy_mean.into_scalar().elem::<f32>());
            }
        }
    }
}

fn normalize(values: Vec<f32>) -> Vec<f32> {
    if values.len() < 2 {
        return values;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let var = values.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / values.len() as f32;
    let std = var.sqrt() + 1e-8;
    values.into_iter().map(|a| (a - mean) / std).collect()
}

impl<B: AutodiffBackend> Learner<B> for PpoLearner<B> {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Ppo
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::Ppo(self.hp.clone())
    }

    fn learn_chunk(
        &mut self,
        envs: &mut VecEnv,
        metrics: &mut TrainingMetrics,
    ) -> Result<usize, TrainError> {
        let last_values = self.collect_rollout(envs, metrics)?;
        self.update(&last_values, metrics);
        metrics.iteration += 1;
        tracing::debug!(
            "PPO update {}: policy={:.4}, value={:.4}, entropy={:.4}",
            metrics.iteration,
            metrics.loss("policy").unwrap_or_default(),
            metrics.loss("value").unwrap_or_default(),
            metrics.loss("entropy").unwrap_or_default()
        );
        Ok(self.hp.n_steps * envs.num_envs())
    }

    fn snapshot(&self) -> PolicyModel<B> {
        PolicyModel::Ppo(self.policy.clone())
    }
}
