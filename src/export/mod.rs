//! Checkpoint to ONNX export
//!
//! Loads a trained checkpoint of any supported kind, wraps its actor
//! deterministically and writes a graph with input `obs [batch, 25]` and
//! output `action [batch, 7]`. The traced graph is evaluated on a zero probe
//! and compared with the wrapper before the file is committed.

pub mod graph;
pub mod onnx;
pub mod wrapper;

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use prost::Message;
use tracing::{debug, info};

use crate::rl::backend::{InferenceBackend, default_device};
use crate::rl::checkpoint::{self, CheckpointError};
use crate::rl::policy::{PolicyModel, tensor_to_vec};
use crate::rl::AlgorithmKind;
use crate::schema::{ACTION_SIZE, OBS_SIZE};

pub use graph::{GraphError, PortableGraph};
pub use onnx::{DEFAULT_OPSET, INPUT_NAME, MAX_OPSET, MIN_OPSET, OUTPUT_NAME};
pub use wrapper::DeterministicPolicy;

/// Agreement required between the traced graph and the wrapper on the probe
const PROBE_ABS_TOLERANCE: f32 = 1e-4;
const PROBE_REL_TOLERANCE: f32 = 1e-4;

#[derive(Debug)]
pub enum ExportError {
    CheckpointNotFound(PathBuf),
    UnrecognizedModel {
        path: PathBuf,
        attempted: Vec<AlgorithmKind>,
    },
    Checkpoint(CheckpointError),
    UnsupportedOpset(i64),
    Trace(String),
    Graph(GraphError),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExportError::CheckpointNotFound(path) => {
                write!(formatter, "Model file not found: {}", path.display())
            }
            ExportError::UnrecognizedModel { path, attempted } => {
                let kinds: Vec<&str> = attempted.iter().map(|k| k.name()).collect();
                write!(
                    formatter,
                    "Unrecognized model at {} (tried {})",
                    path.display(),
                    kinds.join(", ")
                )
            }
            ExportError::Checkpoint(e) => write!(formatter, "{}", e),
            ExportError::UnsupportedOpset(opset) => write!(
                formatter,
                "Opset {} is not supported (expected {}..={})",
                opset, MIN_OPSET, MAX_OPSET
            ),
            ExportError::Trace(message) => write!(formatter, "Tracing failed: {}", message),
            ExportError::Graph(e) => write!(formatter, "Graph error: {}", e),
            ExportError::Io { path, source } => {
                write!(formatter, "I/O error at {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExportError::Checkpoint(e) => Some(e),
            ExportError::Graph(e) => Some(e),
            ExportError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CheckpointError> for ExportError {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::NotFound(path) => ExportError::CheckpointNotFound(path),
            CheckpointError::Unrecognized { path, attempted } => {
                ExportError::UnrecognizedModel { path, attempted }
            }
            other => ExportError::Checkpoint(other),
        }
    }
}

impl From<GraphError> for ExportError {
    fn from(e: GraphError) -> Self {
        ExportError::Graph(e)
    }
}

/// Export the checkpoint at `model_path` to `onnx_path`. Returns the written path.
pub fn export_policy_to_onnx(
    model_path: &Path,
    onnx_path: &Path,
    opset: i64,
) -> Result<PathBuf, ExportError> {
    // Existence is checked before any deserialization
    let weights = checkpoint::resolve(model_path)?;
    check_opset(opset)?;

    let device = default_device();
    let loaded = checkpoint::load::<InferenceBackend>(&weights, &device)?;
    info!(
        "Exporting {} policy from {}",
        loaded.kind(),
        loaded.path.display()
    );
    export_loaded_policy(&loaded.model, onnx_path, opset, &device)
}

/// Export an in-memory model
pub fn export_loaded_policy<B: Backend>(
    model: &PolicyModel<B>,
    onnx_path: &Path,
    opset: i64,
    device: &B::Device,
) -> Result<PathBuf, ExportError> {
    check_opset(opset)?;
    let policy = DeterministicPolicy::new(model.actor());

    let probe = Tensor::<B, 2>::zeros([1, OBS_SIZE], device);
    let expected = policy.forward(probe);
    let dims = expected.dims();
    if dims != [1, ACTION_SIZE] {
        return Err(ExportError::Trace(format!(
            "probe produced shape {:?}, expected [1, {}]",
            dims, ACTION_SIZE
        )));
    }
    let expected = tensor_to_vec(expected).map_err(ExportError::Trace)?;
    if expected.iter().any(|v| !v.is_finite()) {
        return Err(ExportError::Trace(format!(
            "probe produced non-finite actions {:?}",
            expected
        )));
    }

    let graph = PortableGraph::from_model(policy.trace(opset)?)?;
    graph.check_contract()?;
    let actual = graph.run(&[0.0; OBS_SIZE], 1)?;
    for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
        if (e - a).abs() > PROBE_ABS_TOLERANCE + PROBE_REL_TOLERANCE * e.abs() {
            return Err(ExportError::Trace(format!(
                "graph disagrees with the policy at action {}: {} vs {}",
                i, a, e
            )));
        }
    }
    debug!(
        "Traced {} nodes for {} policy",
        graph.model().graph.as_ref().map_or(0, |g| g.node.len()),
        policy.kind()
    );

    write_atomically(onnx_path, &graph.model().encode_to_vec())?;
    info!("Exported policy to {}", onnx_path.display());
    Ok(onnx_path.to_path_buf())
}

/// `path` with `.onnx` appended when it has no extension
pub fn with_onnx_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension("onnx")
    }
}

fn check_opset(opset: i64) -> Result<(), ExportError> {
    if (MIN_OPSET..=MAX_OPSET).contains(&opset) {
        Ok(())
    } else {
        Err(ExportError::UnsupportedOpset(opset))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError {
    let path = path.to_path_buf();
    move |source| ExportError::Io { path, source }
}

/// Write through a sibling temp file so a failed export leaves nothing behind
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let written = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(source) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(ExportError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_onnx_extension() {
        assert_eq!(
            with_onnx_extension(Path::new("out/policy")),
            PathBuf::from("out/policy.onnx")
        );
        assert_eq!(
            with_onnx_extension(Path::new("policy.bin")),
            PathBuf::from("policy.bin")
        );
    }

    #[test]
    fn test_opset_range() {
        assert!(check_opset(DEFAULT_OPSET).is_ok());
        assert!(check_opset(MIN_OPSET).is_ok());
        assert!(check_opset(MAX_OPSET).is_ok());
        assert!(matches!(check_opset(6), Err(ExportError::UnsupportedOpset(6))));
        assert!(matches!(check_opset(22), Err(ExportError::UnsupportedOpset(22))));
    }

    #[test]
    fn test_checkpoint_errors_map_to_export_errors() {
        let missing: ExportError = CheckpointError::NotFound(PathBuf::from("x")).into();
        assert!(matches!(missing, ExportError::CheckpointNotFound(_)));

        let unknown: ExportError = CheckpointError::Unrecognized {
            path: PathBuf::from("m.mpk"),
            attempted: AlgorithmKind::TRIAL_ORDER.to_vec(),
        }
        .into();
        assert_eq!(
            unknown.to_string(),
            "Unrecognized model at m.mpk (tried PPO, SAC, DDPG)"
        );
    }

    #[test]
    fn test_write_atomically_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("policy.onnx");
        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("nested").join("policy.onnx.tmp").exists());
    }

    #[test]
    fn test_failed_write_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.onnx");
        std::fs::write(&path, b"previous").unwrap();
        // A directory in the temp file's place makes the write fail
        std::fs::create_dir(dir.path().join("policy.onnx.tmp")).unwrap();

        let result = write_atomically(&path, b"next");
        assert!(matches!(result, Err(ExportError::Io { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
    }
}
