pub mod export;
pub mod game;
pub mod rl;
pub mod schema;

// Re-export commonly used types for convenience
pub use export::{ExportError, PortableGraph, export_policy_to_onnx};
pub use rl::{AlgorithmKind, PolicyModel, TrainConfig, Trainer};
pub use schema::{ACTION_SIZE, Action, OBS_SIZE, Observation};
