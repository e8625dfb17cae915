//! Backend selection for the binary.
//!
//! Training is generic over `AutodiffBackend`; these aliases pin the
//! concrete choice once so the rest of the crate never names a backend.

#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu;

#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray;

pub type TrainingBackend = burn::backend::Autodiff<InferenceBackend>;
