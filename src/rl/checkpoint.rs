//! Checkpoint bundles: burn record (`<stem>.mpk`) plus JSON metadata
//! (`<stem>.meta.json`) naming the algorithm that produced the weights.
//!
//! Bundles without metadata are identified by trying each algorithm in
//! [`AlgorithmKind::TRIAL_ORDER`] until one deserializes and matches the
//! observation/action sizes.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{
    FullPrecisionSettings, NamedMpkBytesRecorder, NamedMpkFileRecorder, Recorder, RecorderError,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use super::algo::{AlgorithmKind, Hyperparameters};
use super::policy::{DdpgModel, PolicyModel, PpoPolicy, SacModel};
use crate::schema::{ACTION_SIZE, OBS_SIZE};

pub const WEIGHTS_EXTENSION: &str = "mpk";
pub const META_EXTENSION: &str = "meta.json";

#[derive(Debug)]
pub enum CheckpointError {
    NotFound(PathBuf),
    Unrecognized {
        path: PathBuf,
        attempted: Vec<AlgorithmKind>,
    },
    SchemaMismatch {
        path: PathBuf,
        obs_size: usize,
        action_size: usize,
    },
    KindMismatch {
        path: PathBuf,
        expected: AlgorithmKind,
        found: AlgorithmKind,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Metadata {
        path: PathBuf,
        source: serde_json::Error,
    },
    Recorder {
        path: PathBuf,
        source: RecorderError,
    },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckpointError::NotFound(path) => {
                write!(formatter, "Checkpoint not found: {}", path.display())
            }
            CheckpointError::Unrecognized { path, attempted } => {
                let kinds: Vec<&str> = attempted.iter().map(|k| k.name()).collect();
                write!(
                    formatter,
                    "Unrecognized model at {} (tried {})",
                    path.display(),
                    kinds.join(", ")
                )
            }
            CheckpointError::SchemaMismatch {
                path,
                obs_size,
                action_size,
            } => write!(
                formatter,
                "Checkpoint {} was trained for obs {} / action {}, expected {} / {}",
                path.display(),
                obs_size,
                action_size,
                OBS_SIZE,
                ACTION_SIZE
            ),
            CheckpointError::KindMismatch {
                path,
                expected,
                found,
            } => write!(
                formatter,
                "Checkpoint {} holds a {} model, expected {}",
                path.display(),
                found,
                expected
            ),
            CheckpointError::Io { path, source } => {
                write!(formatter, "I/O error on {}: {}", path.display(), source)
            }
            CheckpointError::Metadata { path, source } => {
                write!(formatter, "Invalid metadata {}: {}", path.display(), source)
            }
            CheckpointError::Recorder { path, source } => {
                write!(formatter, "Failed to record {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for CheckpointError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CheckpointError::Io { source, .. } => Some(source),
            CheckpointError::Metadata { source, .. } => Some(source),
            CheckpointError::Recorder { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Sidecar stored next to the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub algorithm: AlgorithmKind,
    pub hyperparameters: Hyperparameters,
    pub obs_size: usize,
    pub action_size: usize,
    /// Environment steps seen when the checkpoint was taken
    pub timesteps: usize,
    pub seed: Option<u64>,
    pub created_at: String,
    pub version: String,
}

impl CheckpointMeta {
    pub fn new(hyperparameters: Hyperparameters, timesteps: usize, seed: Option<u64>) -> Self {
        Self {
            algorithm: hyperparameters.kind(),
            hyperparameters,
            obs_size: OBS_SIZE,
            action_size: ACTION_SIZE,
            timesteps,
            seed,
            created_at: timestamp(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// A model read back from disk
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint<B: Backend> {
    pub model: PolicyModel<B>,
    /// `None` for bundles identified by trial loading
    pub meta: Option<CheckpointMeta>,
    /// Resolved weights file
    pub path: PathBuf,
}

impl<B: Backend> LoadedCheckpoint<B> {
    pub fn kind(&self) -> AlgorithmKind {
        self.model.kind()
    }
}

/// `<stem>.mpk` for a path without extension, otherwise the path itself
pub fn weights_path(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(WEIGHTS_EXTENSION)
    }
}

pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension(META_EXTENSION)
}

/// Locate the weights file for `path`. Accepts the file itself or its stem.
pub fn resolve(path: &Path) -> Result<PathBuf, CheckpointError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    let with_ext = path.with_extension(WEIGHTS_EXTENSION);
    if path.extension().is_none() && with_ext.is_file() {
        return Ok(with_ext);
    }
    Err(CheckpointError::NotFound(path.to_path_buf()))
}

/// Write weights and metadata. Returns the weights file path.
pub fn save<B: Backend>(
    model: &PolicyModel<B>,
    meta: &CheckpointMeta,
    path: &Path,
) -> Result<PathBuf, CheckpointError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let stem = path.with_extension("");
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let recorded = match model {
        PolicyModel::Ppo(policy) => policy.clone().save_file(stem.clone(), &recorder),
        PolicyModel::Sac(model) => model.clone().save_file(stem.clone(), &recorder),
        PolicyModel::Ddpg(model) => model.clone().save_file(stem.clone(), &recorder),
    };
    let weights = weights_path(&stem);
    recorded.map_err(|source| CheckpointError::Recorder {
        path: weights.clone(),
        source,
    })?;

    let meta_file = meta_path(&stem);
    let json = serde_json::to_string_pretty(meta).map_err(|source| CheckpointError::Metadata {
        path: meta_file.clone(),
        source,
    })?;
    std::fs::write(&meta_file, json).map_err(|source| CheckpointError::Io {
        path: meta_file.clone(),
        source,
    })?;

    info!("Saved {} checkpoint to {}", meta.algorithm, weights.display());
    Ok(weights)
}

/// Load a checkpoint of any supported kind
pub fn load<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<LoadedCheckpoint<B>, CheckpointError> {
    let weights = resolve(path)?;
    let bytes = std::fs::read(&weights).map_err(|source| CheckpointError::Io {
        path: weights.clone(),
        source,
    })?;

    let meta = read_meta(&weights)?;
    let model = match &meta {
        Some(meta) => load_tagged(&weights, &bytes, meta, device)?,
        None => {
            warn!(
                "No metadata next to {}, identifying the model by trial loading",
                weights.display()
            );
            load_untagged(&weights, &bytes, device)?
        }
    };

    info!("Loaded {} checkpoint from {}", model.kind(), weights.display());
    Ok(LoadedCheckpoint {
        model,
        meta,
        path: weights,
    })
}

/// Load and require a specific algorithm kind
pub fn load_kind<B: Backend>(
    path: &Path,
    expected: AlgorithmKind,
    device: &B::Device,
) -> Result<LoadedCheckpoint<B>, CheckpointError> {
    let loaded = load(path, device)?;
    if loaded.kind() != expected {
        return Err(CheckpointError::KindMismatch {
            path: loaded.path,
            expected,
            found: loaded.model.kind(),
        });
    }
    Ok(loaded)
}

fn read_meta(weights: &Path) -> Result<Option<CheckpointMeta>, CheckpointError> {
    let meta_file = meta_path(weights);
    if !meta_file.is_file() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(&meta_file).map_err(|source| CheckpointError::Io {
        path: meta_file.clone(),
        source,
    })?;
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|source| CheckpointError::Metadata {
            path: meta_file,
            source,
        })
}

fn load_tagged<B: Backend>(
    weights: &Path,
    bytes: &[u8],
    meta: &CheckpointMeta,
    device: &B::Device,
) -> Result<PolicyModel<B>, CheckpointError> {
    if meta.obs_size != OBS_SIZE || meta.action_size != ACTION_SIZE {
        return Err(CheckpointError::SchemaMismatch {
            path: weights.to_path_buf(),
            obs_size: meta.obs_size,
            action_size: meta.action_size,
        });
    }

    let hyperparameters = if meta.hyperparameters.kind() == meta.algorithm {
        meta.hyperparameters.clone()
    } else {
        meta.algorithm.hyperparameters()
    };

    decode(&hyperparameters, bytes, device).map_err(|_| CheckpointError::Unrecognized {
        path: weights.to_path_buf(),
        attempted: vec![meta.algorithm],
    })
}

fn load_untagged<B: Backend>(
    weights: &Path,
    bytes: &[u8],
    device: &B::Device,
) -> Result<PolicyModel<B>, CheckpointError> {
    let mut attempted = Vec::with_capacity(AlgorithmKind::TRIAL_ORDER.len());
    for kind in AlgorithmKind::TRIAL_ORDER {
        attempted.push(kind);
        match decode(&kind.hyperparameters(), bytes, device) {
            Ok(model) if model.actor_io_dims() == (OBS_SIZE, ACTION_SIZE) => return Ok(model),
            Ok(model) => {
                tracing::debug!("{} layout matched but dims are {:?}", kind, model.actor_io_dims())
            }
            Err(e) => tracing::debug!("Not a {} checkpoint: {}", kind, e),
        }
    }

    Err(CheckpointError::Unrecognized {
        path: weights.to_path_buf(),
        attempted,
    })
}

fn decode<B: Backend>(
    hyperparameters: &Hyperparameters,
    bytes: &[u8],
    device: &B::Device,
) -> Result<PolicyModel<B>, RecorderError> {
    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
    Ok(match PolicyModel::<B>::init(hyperparameters, device) {
        PolicyModel::Ppo(policy) => {
            let record = Recorder::<B>::load(&recorder, bytes.to_vec(), device)?;
            PolicyModel::Ppo(PpoPolicy::load_record(policy, record))
        }
        PolicyModel::Sac(model) => {
            let record = Recorder::<B>::load(&recorder, bytes.to_vec(), device)?;
            PolicyModel::Sac(SacModel::load_record(model, record))
        }
        PolicyModel::Ddpg(model) => {
            let record = Recorder::<B>::load(&recorder, bytes.to_vec(), device)?;
            PolicyModel::Ddpg(DdpgModel::load_record(model, record))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::algo::{PpoHyperparameters, SacHyperparameters};
    use crate::rl::backend::{InferenceBackend, default_device};
    use crate::rl::policy::tensor_to_vec;

    type B = InferenceBackend;

    fn small_ppo() -> Hyperparameters {
        Hyperparameters::Ppo(PpoHyperparameters {
            pi: vec![8],
            vf: vec![8],
            ..Default::default()
        })
    }

    #[test]
    fn test_meta_timestamp_is_rfc3339() {
        let meta = CheckpointMeta::new(small_ppo(), 0, None);
        let created = OffsetDateTime::parse(&meta.created_at, &Rfc3339).unwrap();
        assert!(created.year() >= 2024);
    }

    #[test]
    fn test_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("model");
        assert!(matches!(resolve(&stem), Err(CheckpointError::NotFound(_))));

        std::fs::write(stem.with_extension("mpk"), b"x").unwrap();
        assert_eq!(resolve(&stem).unwrap(), stem.with_extension("mpk"));
        assert_eq!(
            resolve(&stem.with_extension("mpk")).unwrap(),
            stem.with_extension("mpk")
        );
    }

    #[test]
    fn test_save_and_load_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let device = default_device();
        let hp = small_ppo();
        let model = PolicyModel::<B>::init(&hp, &device);
        let meta = CheckpointMeta::new(hp.clone(), 42, Some(7));

        let weights = save(&model, &meta, &dir.path().join("ppo_final")).unwrap();
        assert_eq!(weights, dir.path().join("ppo_final.mpk"));
        assert!(dir.path().join("ppo_final.meta.json").is_file());

        let loaded = load::<B>(&dir.path().join("ppo_final"), &device).unwrap();
        assert_eq!(loaded.kind(), AlgorithmKind::Ppo);
        let loaded_meta = loaded.meta.clone().unwrap();
        assert_eq!(loaded_meta.timesteps, 42);
        assert_eq!(loaded_meta.hyperparameters, hp);

        let (PolicyModel::Ppo(a), PolicyModel::Ppo(b)) = (&model, &loaded.model) else {
            panic!("expected PPO models");
        };
        assert_eq!(
            tensor_to_vec(a.action_net.weight.val()).unwrap(),
            tensor_to_vec(b.action_net.weight.val()).unwrap()
        );
    }

    #[test]
    fn test_untagged_falls_back_to_trial_order() {
        let dir = tempfile::tempdir().unwrap();
        let device = default_device();
        let hp = AlgorithmKind::Sac.hyperparameters();
        let model = PolicyModel::<B>::init(&hp, &device);
        save(&model, &CheckpointMeta::new(hp, 0, None), &dir.path().join("sac")).unwrap();
        std::fs::remove_file(dir.path().join("sac.meta.json")).unwrap();

        let loaded = load::<B>(&dir.path().join("sac.mpk"), &device).unwrap();
        assert_eq!(loaded.kind(), AlgorithmKind::Sac);
        assert!(loaded.meta.is_none());
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mpk");
        std::fs::write(&path, b"definitely not a model").unwrap();

        match load::<B>(&path, &default_device()) {
            Err(CheckpointError::Unrecognized { path: p, attempted }) => {
                assert_eq!(p, path);
                assert_eq!(attempted, AlgorithmKind::TRIAL_ORDER.to_vec());
            }
            other => panic!("unexpected result: {:?}", other.map(|l| l.kind())),
        }
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = default_device();
        let hp = Hyperparameters::Sac(SacHyperparameters {
            pi: vec![8],
            qf: vec![8],
            ..Default::default()
        });
        let model = PolicyModel::<B>::init(&hp, &device);
        let mut meta = CheckpointMeta::new(hp, 0, None);
        meta.obs_size = 30;
        save(&model, &meta, &dir.path().join("old")).unwrap();

        assert!(matches!(
            load::<B>(&dir.path().join("old"), &device),
            Err(CheckpointError::SchemaMismatch { obs_size: 30, .. })
        ));
    }

    #[test]
    fn test_load_kind_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let device = default_device();
        let hp = small_ppo();
        let model = PolicyModel::<B>::init(&hp, &device);
        save(&model, &CheckpointMeta::new(hp, 0, None), &dir.path().join("m")).unwrap();

        assert!(matches!(
            load_kind::<B>(&dir.path().join("m"), AlgorithmKind::Ddpg, &device),
            Err(CheckpointError::KindMismatch { .. })
        ));
    }
}
