//! Backend type aliases and device management
//!
//! Training runs on the autodiff-wrapped NdArray backend; loading for export
//! and evaluation uses the plain NdArray backend. The networks are small MLPs,
//! so CPU is enough.

use burn::backend::{
    Autodiff,
    ndarray::{NdArray, NdArrayDevice},
};

/// Backend type for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend type for export and inference
pub type InferenceBackend = NdArray<f32>;

pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
