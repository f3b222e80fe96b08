//! Training loop: drives a learner, checkpoints, evaluates, keeps the best model

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use super::algo::{AlgorithmKind, Hyperparameters};
use super::checkpoint::{self, CheckpointError, CheckpointMeta};
use super::ddpg::DdpgLearner;
use super::env::{EnvConfig, RocketLeagueEnv, VecEnv};
use super::metrics::{EvaluationMetrics, ScalarLogger, TrainingMetrics};
use super::policy::PolicyModel;
use super::ppo::PpoLearner;
use super::sac::SacLearner;
use crate::export::DeterministicPolicy;
use crate::schema;

#[derive(Debug)]
pub enum TrainError {
    Checkpoint(CheckpointError),
    Io(std::io::Error),
    /// Tensor data could not be read back
    Tensor(String),
}

impl fmt::Display for TrainError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrainError::Checkpoint(e) => write!(formatter, "Checkpoint error: {}", e),
            TrainError::Io(e) => write!(formatter, "I/O error: {}", e),
            TrainError::Tensor(message) => write!(formatter, "Tensor error: {}", message),
        }
    }
}

impl Error for TrainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainError::Checkpoint(e) => Some(e),
            TrainError::Io(e) => Some(e),
            TrainError::Tensor(_) => None,
        }
    }
}

impl From<CheckpointError> for TrainError {
    fn from(e: CheckpointError) -> Self {
        TrainError::Checkpoint(e)
    }
}

impl From<std::io::Error> for TrainError {
    fn from(e: std::io::Error) -> Self {
        TrainError::Io(e)
    }
}

/// One algorithm's update rule, advanced a chunk at a time
pub trait Learner<B: AutodiffBackend> {
    fn kind(&self) -> AlgorithmKind;

    fn hyperparameters(&self) -> Hyperparameters;

    /// Collect experience and update. Returns the env steps consumed.
    fn learn_chunk(
        &mut self,
        envs: &mut VecEnv,
        metrics: &mut TrainingMetrics,
    ) -> Result<usize, TrainError>;

    /// Current weights
    fn snapshot(&self) -> PolicyModel<B>;
}

/// Wrap `model` in the learner for its family. Hyperparameters of another
/// family are replaced by the model family's defaults.
pub fn build_learner<B: AutodiffBackend>(
    model: PolicyModel<B>,
    hp: Hyperparameters,
    seed: u64,
    device: &B::Device,
) -> Box<dyn Learner<B>> {
    match (model, hp) {
        (PolicyModel::Ppo(policy), Hyperparameters::Ppo(hp)) => {
            Box::new(PpoLearner::new(policy, hp, seed, device.clone()))
        }
        (PolicyModel::Ppo(policy), _) => {
            Box::new(PpoLearner::new(policy, Default::default(), seed, device.clone()))
        }
        (PolicyModel::Sac(model), Hyperparameters::Sac(hp)) => {
            Box::new(SacLearner::new(model, hp, seed, device.clone()))
        }
        (PolicyModel::Sac(model), _) => {
            Box::new(SacLearner::new(model, Default::default(), seed, device.clone()))
        }
        (PolicyModel::Ddpg(model), Hyperparameters::Ddpg(hp)) => {
            Box::new(DdpgLearner::new(model, hp, seed, device.clone()))
        }
        (PolicyModel::Ddpg(model), _) => {
            Box::new(DdpgLearner::new(model, Default::default(), seed, device.clone()))
        }
    }
}

const EVAL_SEED_OFFSET: u64 = 1000;

/// Training configuration
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub algorithm: AlgorithmKind,
    pub total_timesteps: usize,
    /// Root for checkpoints, best model, progress logs and the final model
    pub save_dir: PathBuf,
    pub seed: u64,
    /// Parallel environments; only PPO uses more than one
    pub n_envs: usize,
    /// Environment steps between periodic checkpoints
    pub checkpoint_freq: usize,
    /// Vectorized steps between evaluations
    pub eval_freq: usize,
    pub n_eval_episodes: usize,
    /// Environment steps between progress log lines
    pub log_interval: usize,
    pub env_config: EnvConfig,
    /// Overrides the algorithm's default table
    pub hyperparameters: Option<Hyperparameters>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::Ppo,
            total_timesteps: 100_000,
            save_dir: PathBuf::from("runs"),
            seed: 0,
            n_envs: 4,
            checkpoint_freq: 10_000,
            eval_freq: 5_000,
            n_eval_episodes: 5,
            log_interval: 10_000,
            env_config: EnvConfig::default(),
            hyperparameters: None,
        }
    }
}

impl TrainConfig {
    pub fn num_envs(&self) -> usize {
        if self.algorithm.uses_parallel_envs() {
            self.n_envs.max(1)
        } else {
            1
        }
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        match &self.hyperparameters {
            Some(hp) if hp.kind() == self.algorithm => hp.clone(),
            _ => self.algorithm.hyperparameters(),
        }
    }

    /// Seed of the held-out evaluation environment
    pub fn eval_seed(&self) -> u64 {
        self.seed.wrapping_add(EVAL_SEED_OFFSET)
    }

    pub fn final_model_path(&self) -> PathBuf {
        self.save_dir.join(format!("{}_final", self.algorithm.file_prefix()))
    }

    pub fn best_model_path(&self) -> PathBuf {
        self.save_dir.join("best").join("best_model")
    }

    pub fn checkpoint_path(&self, timesteps: usize) -> PathBuf {
        self.save_dir.join("checkpoints").join(format!(
            "{}_{}_steps",
            self.algorithm.file_prefix(),
            timesteps
        ))
    }
}

fn crossed(before: usize, after: usize, freq: usize) -> bool {
    freq > 0 && after / freq > before / freq
}

pub struct Trainer<B: AutodiffBackend> {
    config: TrainConfig,
    learner: Box<dyn Learner<B>>,
    envs: VecEnv,
    eval_env: RocketLeagueEnv,
    metrics: TrainingMetrics,
    logger: ScalarLogger,
    device: B::Device,
    num_timesteps: usize,
    best_mean_reward: f32,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self, TrainError> {
        B::seed(config.seed);

        let hp = config.hyperparameters();
        let model = PolicyModel::<B>::init(&hp, &device);
        let learner = build_learner(model, hp, config.seed, &device);

        let n_envs = config.num_envs();
        let envs = VecEnv::seeded(n_envs, config.seed, &config.env_config).with_parallel(n_envs > 1);
        let eval_env = RocketLeagueEnv::new(EnvConfig {
            seed: Some(config.eval_seed()),
            ..config.env_config.clone()
        });
        let logger = ScalarLogger::new(config.save_dir.join("progress"))?;

        Ok(Self {
            config,
            learner,
            envs,
            eval_env,
            metrics: TrainingMetrics::default(),
            logger,
            device,
            num_timesteps: 0,
            best_mean_reward: f32::NEG_INFINITY,
        })
    }

    /// Continue from an existing checkpoint of the same algorithm
    pub fn resume(&mut self, path: &Path) -> Result<(), TrainError> {
        let loaded = checkpoint::load_kind::<B>(path, self.config.algorithm, &self.device)?;
        let hp = loaded
            .meta
            .map(|meta| meta.hyperparameters)
            .unwrap_or_else(|| self.config.hyperparameters());
        info!("Resuming {} from {}", self.config.algorithm, loaded.path.display());
        self.learner = build_learner(loaded.model, hp, self.config.seed, &self.device);
        Ok(())
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    /// Run the training loop. Returns the final model's weights path.
    pub fn train(&mut self) -> Result<PathBuf, TrainError> {
        let n_envs = self.envs.num_envs();
        info!(
            "Training {} for {} timesteps on {} env(s), saving to {}",
            self.learner.kind(),
            self.config.total_timesteps,
            n_envs,
            self.config.save_dir.display()
        );

        while self.num_timesteps < self.config.total_timesteps {
            let before = self.num_timesteps;
            self.num_timesteps += self.learner.learn_chunk(&mut self.envs, &mut self.metrics)?;
            let after = self.num_timesteps;

            if crossed(before, after, self.config.log_interval) {
                self.metrics.log_to_console();
                self.logger.log_metrics(&self.metrics)?;
            }

            if crossed(before, after, self.config.checkpoint_freq) {
                let path = self.config.checkpoint_path(after);
                self.save(&path)?;
            }

            if crossed(before / n_envs, after / n_envs, self.config.eval_freq) {
                self.evaluate_and_track_best()?;
            }
        }

        let path = self.config.final_model_path();
        let weights = self.save(&path)?;
        info!("Training complete after {} timesteps", self.num_timesteps);
        Ok(weights)
    }

    /// Save the current model with metadata
    pub fn save(&self, path: &Path) -> Result<PathBuf, TrainError> {
        let meta = CheckpointMeta::new(
            self.learner.hyperparameters(),
            self.num_timesteps,
            Some(self.config.seed),
        );
        Ok(checkpoint::save(&self.learner.snapshot(), &meta, path)?)
    }

    /// Deterministic rollouts on the held-out env
    pub fn evaluate(&mut self, n_episodes: usize) -> Result<EvaluationMetrics, TrainError> {
        let model = self.learner.snapshot().valid();
        let policy = DeterministicPolicy::new(model.actor());
        let space = schema::action_space();
        let mut results = EvaluationMetrics::new();

        for _ in 0..n_episodes {
            let mut obs = self.eval_env.reset();
            let mut total_reward = 0.0;
            loop {
                let action = policy.act(&obs, &self.device).map_err(TrainError::Tensor)?;
                let step = self.eval_env.step(&space.clip(&action));
                total_reward += step.reward;
                obs = step.observation;
                if step.done() {
                    results.record_episode(total_reward, step.info.steps);
                    break;
                }
            }
        }

        Ok(results)
    }

    fn evaluate_and_track_best(&mut self) -> Result<(), TrainError> {
        let results = self.evaluate(self.config.n_eval_episodes)?;
        results.print_summary();
        self.logger
            .log_scalar("eval/mean_reward", results.avg_reward(), self.num_timesteps)?;

        if results.avg_reward() > self.best_mean_reward {
            self.best_mean_reward = results.avg_reward();
            info!("New best mean reward {:.3}", self.best_mean_reward);
            let path = self.config.best_model_path();
            self.save(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::algo::{DdpgHyperparameters, PpoHyperparameters};
    use crate::rl::backend::{InferenceBackend, TrainingBackend, default_device};

    #[test]
    fn test_train_config_default() {
        let config = TrainConfig::default();
        assert_eq!(config.total_timesteps, 100_000);
        assert_eq!(config.num_envs(), 4);
        assert_eq!(config.checkpoint_freq, 10_000);
        assert_eq!(config.eval_freq, 5_000);

        let sac = TrainConfig {
            algorithm: AlgorithmKind::Sac,
            ..Default::default()
        };
        assert_eq!(sac.num_envs(), 1);
        assert!(sac.final_model_path().ends_with("sac_final"));
        assert!(sac.checkpoint_path(10_000).ends_with("checkpoints/sac_10000_steps"));
    }

    #[test]
    fn test_seeds_near_max_wrap() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            algorithm: AlgorithmKind::Ddpg,
            save_dir: dir.path().to_path_buf(),
            seed: u64::MAX - 500,
            ..Default::default()
        };
        assert_eq!(config.eval_seed(), 499);
        assert_eq!(TrainConfig::default().eval_seed(), 1000);
        assert!(Trainer::<TrainingBackend>::new(config, default_device()).is_ok());
    }

    #[test]
    fn test_crossed() {
        assert!(crossed(9_000, 10_000, 10_000));
        assert!(crossed(8_192, 16_384, 10_000));
        assert!(!crossed(10_000, 10_001, 10_000));
        assert!(!crossed(0, 100, 0));
    }

    #[test]
    fn test_short_ppo_run_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            total_timesteps: 32,
            save_dir: dir.path().to_path_buf(),
            n_envs: 2,
            checkpoint_freq: 16,
            eval_freq: 8,
            n_eval_episodes: 1,
            log_interval: 16,
            env_config: EnvConfig {
                max_episode_steps: 6,
                ..Default::default()
            },
            hyperparameters: Some(Hyperparameters::Ppo(PpoHyperparameters {
                n_steps: 8,
                batch_size: 8,
                n_epochs: 1,
                pi: vec![8],
                vf: vec![8],
                ..Default::default()
            })),
            ..Default::default()
        };

        let mut trainer = Trainer::<TrainingBackend>::new(config, default_device()).unwrap();
        let weights = trainer.train().unwrap();

        assert_eq!(trainer.num_timesteps(), 32);
        assert_eq!(weights, dir.path().join("ppo_final.mpk"));
        assert!(dir.path().join("checkpoints/ppo_16_steps.mpk").is_file());
        assert!(dir.path().join("best/best_model.mpk").is_file());
        assert!(dir.path().join("progress/episode_reward.csv").is_file());

        let loaded = checkpoint::load::<InferenceBackend>(&weights, &default_device()).unwrap();
        assert_eq!(loaded.kind(), AlgorithmKind::Ppo);
        assert_eq!(loaded.meta.unwrap().timesteps, 32);
    }

    #[test]
    fn test_evaluate_runs_full_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            algorithm: AlgorithmKind::Ddpg,
            save_dir: dir.path().to_path_buf(),
            env_config: EnvConfig {
                max_episode_steps: 10,
                ..Default::default()
            },
            hyperparameters: Some(Hyperparameters::Ddpg(DdpgHyperparameters {
                pi: vec![8],
                qf: vec![8],
                ..Default::default()
            })),
            ..Default::default()
        };
        let mut trainer = Trainer::<TrainingBackend>::new(config, default_device()).unwrap();
        let results = trainer.evaluate(3).unwrap();
        assert_eq!(results.num_episodes(), 3);
        assert!((results.avg_steps() - 10.0).abs() < 1e-6);
        assert!((results.avg_reward() + 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_resume_requires_same_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            save_dir: dir.path().to_path_buf(),
            hyperparameters: Some(Hyperparameters::Ppo(PpoHyperparameters {
                pi: vec![8],
                vf: vec![8],
                ..Default::default()
            })),
            ..Default::default()
        };
        let trainer = Trainer::<TrainingBackend>::new(config, default_device()).unwrap();
        let saved = trainer.save(&dir.path().join("ppo_start")).unwrap();

        let mut sac = Trainer::<TrainingBackend>::new(
            TrainConfig {
                algorithm: AlgorithmKind::Sac,
                save_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            default_device(),
        )
        .unwrap();
        assert!(matches!(
            sac.resume(&saved),
            Err(TrainError::Checkpoint(CheckpointError::KindMismatch { .. }))
        ));
    }
}
