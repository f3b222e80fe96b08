//! Reinforcement learning for the vehicle-and-ball policy
//!
//! Three algorithm families share one environment adapter, one observation
//! normalization and one checkpoint format:
//! - PPO: on-policy, Gaussian actor, several environments stepped in parallel
//! - SAC: off-policy, squashed Gaussian actor, twin critics, learned temperature
//! - DDPG: off-policy, deterministic tanh actor, single critic
//!
//! # Architecture
//!
//! ```text
//! schema (OBS_SIZE, ACTION_SIZE, bounds)
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RocketLeagueEnv / VecEnv                                   │
//! │  - reset / step over the schema spaces                      │
//! │  - auto-reset, optional scoped worker threads               │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Learner (PpoLearner | SacLearner | DdpgLearner)            │
//! │  - rollout or replay buffer                                 │
//! │  - Adam updates on the PolicyModel                          │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Trainer                                                    │
//! │  - periodic checkpoints, evaluation, best model             │
//! │  - <stem>.mpk + <stem>.meta.json bundles                    │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! export::export_policy_to_onnx
//! ```

pub mod algo;
pub mod backend;
pub mod buffer;
pub mod checkpoint;
pub mod ddpg;
pub mod env;
pub mod metrics;
pub mod policy;
pub mod ppo;
pub mod sac;
pub mod train;

// Re-export commonly used types
pub use algo::{AlgorithmKind, Hyperparameters};
pub use backend::{InferenceBackend, TrainingBackend, default_device};
pub use checkpoint::{CheckpointError, CheckpointMeta, LoadedCheckpoint};
pub use env::{EnvConfig, RocketLeagueEnv, StepInfo, StepResult, VecEnv};
pub use metrics::{EvaluationMetrics, TrainingMetrics};
pub use policy::{ActorPolicy, PolicyModel};
pub use train::{Learner, TrainConfig, TrainError, Trainer};
