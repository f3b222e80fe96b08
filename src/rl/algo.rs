//! Supported algorithm families and their fixed hyperparameter tables

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::ACTION_SIZE;

/// Algorithm family that produced a checkpoint
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum AlgorithmKind {
    /// Clipped policy gradient, on-policy, vectorized rollouts
    #[serde(rename = "PPO")]
    #[value(name = "PPO")]
    Ppo,
    /// Entropy-regularized actor-critic with replay
    #[serde(rename = "SAC")]
    #[value(name = "SAC")]
    Sac,
    /// Deterministic policy gradient with replay
    #[serde(rename = "DDPG")]
    #[value(name = "DDPG")]
    Ddpg,
}

impl AlgorithmKind {
    /// Order in which untagged checkpoints are tried
    pub const TRIAL_ORDER: [AlgorithmKind; 3] =
        [AlgorithmKind::Ppo, AlgorithmKind::Sac, AlgorithmKind::Ddpg];

    pub fn name(self) -> &'static str {
        match self {
            AlgorithmKind::Ppo => "PPO",
            AlgorithmKind::Sac => "SAC",
            AlgorithmKind::Ddpg => "DDPG",
        }
    }

    /// Lowercase prefix for checkpoint file names
    pub fn file_prefix(self) -> &'static str {
        match self {
            AlgorithmKind::Ppo => "ppo",
            AlgorithmKind::Sac => "sac",
            AlgorithmKind::Ddpg => "ddpg",
        }
    }

    /// Only the on-policy family collects from several environments at once
    pub fn uses_parallel_envs(self) -> bool {
        matches!(self, AlgorithmKind::Ppo)
    }

    pub fn hyperparameters(self) -> Hyperparameters {
        match self {
            AlgorithmKind::Ppo => Hyperparameters::Ppo(PpoHyperparameters::default()),
            AlgorithmKind::Sac => Hyperparameters::Sac(SacHyperparameters::default()),
            AlgorithmKind::Ddpg => Hyperparameters::Ddpg(DdpgHyperparameters::default()),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PPO" => Ok(AlgorithmKind::Ppo),
            "SAC" => Ok(AlgorithmKind::Sac),
            "DDPG" => Ok(AlgorithmKind::Ddpg),
            other => Err(format!("unknown algorithm '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpoHyperparameters {
    pub learning_rate: f64,
    /// Steps collected per environment before each update
    pub n_steps: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub clip_range: f32,
    pub max_grad_norm: f32,
    /// Hidden layers of the policy branch
    pub pi: Vec<usize>,
    /// Hidden layers of the value branch
    pub vf: Vec<usize>,
}

impl Default for PpoHyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            n_steps: 2048,
            batch_size: 64,
            n_epochs: 10,
            gamma: 0.99,
            gae_lambda: 0.95,
            ent_coef: 0.01,
            vf_coef: 0.5,
            clip_range: 0.2,
            max_grad_norm: 0.5,
            pi: vec![256, 256],
            vf: vec![256, 256],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SacHyperparameters {
    pub learning_rate: f64,
    pub buffer_size: usize,
    pub batch_size: usize,
    pub gamma: f32,
    /// Polyak coefficient for the target critic
    pub tau: f32,
    /// Uniform random actions before the first gradient step
    pub learning_starts: usize,
    pub target_entropy: f32,
    pub pi: Vec<usize>,
    pub qf: Vec<usize>,
}

impl Default for SacHyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            buffer_size: 100_000,
            batch_size: 256,
            gamma: 0.99,
            tau: 0.005,
            learning_starts: 100,
            target_entropy: -(ACTION_SIZE as f32),
            pi: vec![256, 256],
            qf: vec![256, 256],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdpgHyperparameters {
    pub learning_rate: f64,
    pub buffer_size: usize,
    pub batch_size: usize,
    pub gamma: f32,
    pub tau: f32,
    pub learning_starts: usize,
    /// Std of the Gaussian noise added to actions in `[-1, 1]` space
    pub exploration_noise: f32,
    pub pi: Vec<usize>,
    pub qf: Vec<usize>,
}

impl Default for DdpgHyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            buffer_size: 100_000,
            batch_size: 256,
            gamma: 0.99,
            tau: 0.005,
            learning_starts: 100,
            exploration_noise: 0.1,
            pi: vec![256, 256],
            qf: vec![256, 256],
        }
    }
}

/// Hyperparameters of one algorithm family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hyperparameters {
    #[serde(rename = "PPO")]
    Ppo(PpoHyperparameters),
    #[serde(rename = "SAC")]
    Sac(SacHyperparameters),
    #[serde(rename = "DDPG")]
    Ddpg(DdpgHyperparameters),
}

impl Hyperparameters {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Hyperparameters::Ppo(_) => AlgorithmKind::Ppo,
            Hyperparameters::Sac(_) => AlgorithmKind::Sac,
            Hyperparameters::Ddpg(_) => AlgorithmKind::Ddpg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyperparameter_tables() {
        let ppo = PpoHyperparameters::default();
        assert_eq!(ppo.n_steps, 2048);
        assert_eq!(ppo.batch_size, 64);
        assert_eq!(ppo.pi, vec![256, 256]);

        let sac = SacHyperparameters::default();
        assert_eq!(sac.batch_size, 256);
        assert!((sac.target_entropy + 7.0).abs() < 1e-6);

        let ddpg = DdpgHyperparameters::default();
        assert!((ddpg.learning_rate - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_kind_names() {
        for kind in AlgorithmKind::TRIAL_ORDER {
            assert_eq!(kind.name().parse::<AlgorithmKind>(), Ok(kind));
            assert_eq!(kind.hyperparameters().kind(), kind);
        }
        assert!("A2C".parse::<AlgorithmKind>().is_err());
        assert!(AlgorithmKind::Ppo.uses_parallel_envs());
        assert!(!AlgorithmKind::Sac.uses_parallel_envs());
    }

    #[test]
    fn test_kind_serializes_as_name() {
        let json = serde_json::to_string(&AlgorithmKind::Ddpg).unwrap();
        assert_eq!(json, "\"DDPG\"");
    }
}
