//! DDPG learner: deterministic actor, single critic, Gaussian exploration

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Distribution, ElementConversion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::algo::{AlgorithmKind, DdpgHyperparameters, Hyperparameters};
use super::buffer::{ReplayBatch, ReplayBuffer, Transition};
use super::env::VecEnv;
use super::metrics::TrainingMetrics;
use super::policy::{
    ContinuousCritic, DdpgActor, DdpgModel, PolicyModel, rows_to_tensor, tensor_to_rows,
    tensor_to_vec,
};
use super::train::{Learner, TrainError};
use crate::schema::{self, ACTION_SIZE, Action, OBS_SIZE, Observation};

pub struct DdpgLearner<B: AutodiffBackend> {
    model: DdpgModel<B>,
    actor_optim: OptimizerAdaptor<Adam, DdpgActor<B>, B>,
    critic_optim: OptimizerAdaptor<Adam, ContinuousCritic<B>, B>,
    hp: DdpgHyperparameters,
    replay: ReplayBuffer,
    last_obs: Option<Vec<Observation>>,
    num_timesteps: usize,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> DdpgLearner<B> {
    pub fn new(model: DdpgModel<B>, hp: DdpgHyperparameters, seed: u64, device: B::Device) -> Self {
        Self {
            model,
            actor_optim: AdamConfig::new().init(),
            critic_optim: AdamConfig::new().init(),
            replay: ReplayBuffer::new(hp.buffer_size),
            hp,
            last_obs: None,
            num_timesteps: 0,
            rng: StdRng::seed_from_u64(seed),
            device,
        }
    }

    pub fn model(&self) -> &DdpgModel<B> {
        &self.model
    }

    /// Actor output plus Gaussian noise, clipped to `[-1, 1]`
    fn select_actions(&mut self, obs: &[Observation]) -> Result<Vec<Action>, TrainError> {
        if self.num_timesteps < self.hp.learning_starts {
            return Ok(obs
                .iter()
                .map(|_| std::array::from_fn(|_| self.rng.random_range(-1.0f32..=1.0)))
                .collect());
        }

        let actor = self.model.actor.valid();
        let obs_tensor = rows_to_tensor::<B::InnerBackend, OBS_SIZE>(obs, &self.device);
        let actions = actor.forward(obs_tensor);
        let noise = Tensor::random(
            actions.shape(),
            Distribution::Normal(0.0, self.hp.exploration_noise as f64),
            &self.device,
        );
        let actions = (actions + noise).clamp(-1.0, 1.0);
        tensor_to_rows::<_, ACTION_SIZE>(actions).map_err(TrainError::Tensor)
    }

    fn train_step(&mut self, metrics: &mut TrainingMetrics) -> Result<(), TrainError> {
        let batch = self.replay.sample(&mut self.rng, self.hp.batch_size);
        let obs = rows_to_tensor::<B, OBS_SIZE>(&batch.observations, &self.device);
        let actions = rows_to_tensor::<B, ACTION_SIZE>(&batch.actions, &self.device);

        let target = self.td_target(&batch)?;
        let target = Tensor::<B, 1>::from_floats(target.as_slice(), &self.device);
        let critic_loss = self
            .model
            .critic
            .forward(obs.clone(), actions)
            .into_iter()
            .map(|q| (q - target.clone()).powf_scalar(2.0).mean())
            .reduce(|a, b| a + b)
            .unwrap_or_else(|| Tensor::zeros([1], &self.device));
        let grads = GradientsParams::from_grads(critic_loss.clone().backward(), &self.model.critic);
        self.model.critic = self.critic_optim.step(
            self.hp.learning_rate,
            self.model.critic.clone(),
            grads,
        );

        let pi_actions = self.model.actor.forward(obs.clone());
        let actor_loss = -self.model.critic.min_q(obs, pi_actions).mean();
        let grads = GradientsParams::from_grads(actor_loss.clone().backward(), &self.model.actor);
        self.model.actor = self
            .actor_optim
            .step(self.hp.learning_rate, self.model.actor.clone(), grads);

        self.model.critic_target = self
            .model
            .critic_target
            .clone()
            .soft_update(&self.model.critic, self.hp.tau);
        self.model.actor_target = self
            .model
            .actor_target
            .clone()
            .soft_update(&self.model.actor, self.hp.tau);

        metrics.record_loss("actor", actor_loss.into_scalar().elem::<f32>());
        metrics.record_loss("critic", critic_loss.into_scalar().elem::<f32>());
        metrics.iteration += 1;
        Ok(())
    }

    /// `r + gamma * (1 - done) * Q_target(s', mu_target(s'))`
    fn td_target(&self, batch: &ReplayBatch) -> Result<Vec<f32>, TrainError> {
        let actor_target = self.model.actor_target.valid();
        let critic_target = self.model.critic_target.valid();
        let next_obs =
            rows_to_tensor::<B::InnerBackend, OBS_SIZE>(&batch.next_observations, &self.device);
        let next_actions = actor_target.forward(next_obs.clone());
        let next_q = tensor_to_vec(critic_target.min_q(next_obs, next_actions))
            .map_err(TrainError::Tensor)?;

        Ok(next_q
            .iter()
            .zip(batch.rewards.iter().zip(batch.dones.iter()))
            .map(|(q, (r, d))| r + (1.0 - d) * self.hp.gamma * q)
            .collect())
    }
}

impl<B: AutodiffBackend> Learner<B> for DdpgLearner<B> {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Ddpg
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::Ddpg(self.hp.clone())
    }

    fn learn_chunk(
        &mut self,
        envs: &mut VecEnv,
        metrics: &mut TrainingMetrics,
    ) -> Result<usize, TrainError> {
        let obs = match self.last_obs.take() {
            Some(obs) => obs,
            None => envs.reset_all(),
        };

        let scaled = self.select_actions(&obs)?;
        let space = schema::action_space();
        let env_actions: Vec<Action> = scaled.iter().map(|a| space.unscale(a)).collect();
        let results = envs.step_all(&env_actions);
        metrics.track_steps(&results);

        for ((observation, action), result) in obs.iter().zip(scaled.iter()).zip(results.iter()) {
            self.replay.push(Transition {
                observation: *observation,
                action: *action,
                reward: result.reward,
                next_observation: result.info.terminal_observation.unwrap_or(result.observation),
                done: result.terminated,
            });
        }

        self.num_timesteps += results.len();
        self.last_obs = Some(results.into_iter().map(|r| r.observation).collect());

        if self.num_timesteps > self.hp.learning_starts && !self.replay.is_empty() {
            self.train_step(metrics)?;
        }

        Ok(envs.num_envs())
    }

    fn snapshot(&self) -> PolicyModel<B> {
        PolicyModel::Ddpg(self.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::backend::{TrainingBackend, default_device};
    use crate::rl::env::EnvConfig;

    #[test]
    fn test_training_moves_actor_and_target() {
        let device = default_device();
        let hp = DdpgHyperparameters {
            batch_size: 4,
            learning_starts: 2,
            pi: vec![16],
            qf: vec![16],
            ..Default::default()
        };
        let model = DdpgModel::<TrainingBackend>::new(&device, &hp);
        let actor_before = tensor_to_vec(model.actor.mu.weight.val()).unwrap();
        let target_before = tensor_to_vec(model.actor_target.mu.weight.val()).unwrap();

        let mut learner = DdpgLearner::new(model, hp, 0, device);
        let mut envs = VecEnv::seeded(1, 0, &EnvConfig::default());
        let mut metrics = TrainingMetrics::default();
        for _ in 0..6 {
            learner.learn_chunk(&mut envs, &mut metrics).unwrap();
        }

        assert_eq!(metrics.iteration, 4);
        assert!(metrics.loss("actor").unwrap().is_finite());
        let actor_after = tensor_to_vec(learner.model().actor.mu.weight.val()).unwrap();
        let target_after = tensor_to_vec(learner.model().actor_target.mu.weight.val()).unwrap();
        assert_ne!(actor_before, actor_after);
        assert_ne!(target_before, target_after);
    }
}
