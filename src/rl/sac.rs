//! SAC learner: replay, twin critics, learned entropy temperature

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::algo::{AlgorithmKind, Hyperparameters, SacHyperparameters};
use super::buffer::{ReplayBatch, ReplayBuffer, Transition};
use super::env::VecEnv;
use super::metrics::TrainingMetrics;
use super::policy::{
    ContinuousCritic, EntropyCoefficient, PolicyModel, SacActor, SacModel, rows_to_tensor,
    tensor_to_rows, tensor_to_vec,
};
use super::train::{Learner, TrainError};
use crate::schema::{self, ACTION_SIZE, Action, OBS_SIZE, Observation};

pub struct SacLearner<B: AutodiffBackend> {
    model: SacModel<B>,
    actor_optim: OptimizerAdaptor<Adam, SacActor<B>, B>,
    critic_optim: OptimizerAdaptor<Adam, ContinuousCritic<B>, B>,
    entropy_optim: OptimizerAdaptor<Adam, EntropyCoefficient<B>, B>,
    hp: SacHyperparameters,
    replay: ReplayBuffer,
    last_obs: Option<Vec<Observation>>,
    num_timesteps: usize,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> SacLearner<B> {
    pub fn new(model: SacModel<B>, hp: SacHyperparameters, seed: u64, device: B::Device) -> Self {
        Self {
            model,
            actor_optim: AdamConfig::new().init(),
            critic_optim: AdamConfig::new().init(),
            entropy_optim: AdamConfig::new().init(),
            replay: ReplayBuffer::new(hp.buffer_size),
            hp,
            last_obs: None,
            num_timesteps: 0,
            rng: StdRng::seed_from_u64(seed),
            device,
        }
    }

    pub fn model(&self) -> &SacModel<B> {
        &self.model
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Actions in `[-1, 1]`: uniform before `learning_starts`, policy samples after
    fn select_actions(&mut self, obs: &[Observation]) -> Result<Vec<Action>, TrainError> {
        if self.num_timesteps < self.hp.learning_starts {
            return Ok(obs
                .iter()
                .map(|_| std::array::from_fn(|_| self.rng.random_range(-1.0f32..=1.0)))
                .collect());
        }

        let actor = self.model.actor.valid();
        let obs_tensor = rows_to_tensor::<B::InnerBackend, OBS_SIZE>(obs, &self.device);
        let (actions, _) = actor.sample(obs_tensor);
        tensor_to_rows::<_, ACTION_SIZE>(actions).map_err(TrainError::Tensor)
    }

    fn train_step(&mut self, metrics: &mut TrainingMetrics) -> Result<(), TrainError> {
        let batch = self.replay.sample(&mut self.rng, self.hp.batch_size);
        let obs = rows_to_tensor::<B, OBS_SIZE>(&batch.observations, &self.device);
        let actions = rows_to_tensor::<B, ACTION_SIZE>(&batch.actions, &self.device);

        // Temperature
        let actor = self.model.actor.valid();
        let (_, log_pi) = actor.sample(rows_to_tensor::<B::InnerBackend, OBS_SIZE>(
            &batch.observations,
            &self.device,
        ));
        let mean_log_pi = log_pi.mean().into_scalar().elem::<f32>();
        let ent_loss =
            -(self.model.entropy.log_alpha.val() * (mean_log_pi + self.hp.target_entropy));
        let grads = GradientsParams::from_grads(ent_loss.clone().backward(), &self.model.entropy);
        self.model.entropy = self.entropy_optim.step(
            self.hp.learning_rate,
            self.model.entropy.clone(),
            grads,
        );
        let alpha = self.model.entropy.alpha().into_scalar().elem::<f32>();

        // Critics
        let target = self.td_target(&batch, alpha)?;
        let target = Tensor::<B, 1>::from_floats(target.as_slice(), &self.device);
        let critic_loss = self
            .model
            .critic
            .forward(obs.clone(), actions)
            .into_iter()
            .map(|q| (q - target.clone()).powf_scalar(2.0).mean() * 0.5)
            .reduce(|a, b| a + b)
            .unwrap_or_else(|| Tensor::zeros([1], &self.device));
        let grads = GradientsParams::from_grads(critic_loss.clone().backward(), &self.model.critic);
        self.model.critic = self.critic_optim.step(
            self.hp.learning_rate,
            self.model.critic.clone(),
            grads,
        );

        // Actor
        let (pi_actions, log_pi) = self.model.actor.sample(obs.clone());
        let q_pi = self.model.critic.min_q(obs, pi_actions);
        let actor_loss = (log_pi * alpha - q_pi).mean();
        let grads = GradientsParams::from_grads(actor_loss.clone().backward(), &self.model.actor);
        self.model.actor = self
            .actor_optim
            .step(self.hp.learning_rate, self.model.actor.clone(), grads);

        self.model.critic_target = self
            .model
            .critic_target
            .clone()
            .soft_update(&self.model.critic, self.hp.tau);

        metrics.record_loss("actor", actor_loss.into_scalar().elem::<f32>());
        metrics.record_loss("critic", critic_loss.into_scalar().elem::<f32>());
        metrics.record_loss("ent_coef", alpha);
        metrics.record_loss("ent_coef_loss", ent_loss.into_scalar().elem::<f32>());
        metrics.iteration += 1;
        Ok(())
    }

    /// `r + gamma * (1 - done) * (min Q_target(s', a') - alpha * log pi(a'|s'))`
    fn td_target(&self, batch: &ReplayBatch, alpha: f32) -> Result<Vec<f32>, TrainError> {
        let actor = self.model.actor.valid();
        let critic_target = self.model.critic_target.valid();
        let next_obs =
            rows_to_tensor::<B::InnerBackend, OBS_SIZE>(&batch.next_observations, &self.device);
        let (next_actions, next_log_pi) = actor.sample(next_obs.clone());
        let next_q = critic_target.min_q(next_obs, next_actions) - next_log_pi * alpha;
        let next_q = tensor_to_vec(next_q).map_err(TrainError::Tensor)?;

        Ok(next_q
            .iter()
            .zip(batch.rewards.iter().zip(batch.dones.iter()))
            .map(|(q, (r, d))| r + (1.0 - d) * self.hp.gamma * q)
            .collect())
    }
}

impl<B: AutodiffBackend> Learner<B> for SacLearner<B> {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Sac
    }

    fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::Sac(self.hp.clone())
    }

    /// One env step per env, then one gradient step once past `learning_starts`
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
        PolicyModel::Sac(self.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::backend::{TrainingBackend, default_device};
    use crate::rl::env::EnvConfig;

    fn small_hp() -> SacHyperparameters {
        SacHyperparameters {
            batch_size: 8,
            learning_starts: 4,
            pi: vec![16],
            qf: vec![16],
            ..Default::default()
        }
    }

    #[test]
    fn test_warmup_then_training() {
        let device = default_device();
        let hp = small_hp();
        let model = SacModel::<TrainingBackend>::new(&device, &hp);
        let mut learner = SacLearner::new(model, hp, 0, device);
        let mut envs = VecEnv::seeded(1, 0, &EnvConfig::default());
        let mut metrics = TrainingMetrics::default();

        for _ in 0..4 {
            assert_eq!(learner.learn_chunk(&mut envs, &mut metrics).unwrap(), 1);
        }
        assert_eq!(metrics.iteration, 0);
        assert_eq!(learner.replay_len(), 4);

        for _ in 0..3 {
            learner.learn_chunk(&mut envs, &mut metrics).unwrap();
        }
        assert_eq!(metrics.iteration, 3);
        assert!(metrics.loss("critic").unwrap().is_finite());
        assert!(metrics.loss("ent_coef").unwrap() > 0.0);
    }
}
