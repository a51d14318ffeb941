//! GPU runtime-class enforcement for Kubernetes pod admission
//!
//! Provides an admission plugin that attaches the configured GPU `RuntimeClass`
//! to pods requesting GPUs, skipping OpenShift clusters (which pick the GPU
//! runtime themselves) and GPU reservation pods. Plugins are composed into a
//! [`Pipeline`] and exposed to the API server through the warp routes in
//! [`admission`].

pub mod admission;
pub mod cluster;
pub mod config;
mod context;
pub mod environment;
mod error;
pub mod plugin;
pub mod pod;
pub mod registry;
mod runtime_enforcement;

#[cfg(test)]
mod testing;

pub use cluster::{ClusterReader, KubeClusterReader};
pub use config::{Config, MissingRuntimeClassPolicy};
pub use context::Context;
pub use environment::{ClusterEnvironment, EnvironmentDetector};
pub use error::{Error, Result};
pub use plugin::{Pipeline, PodPlugin};
pub use pod::{GpuPodClassifier, PodClassifier};
pub use registry::RuntimeClassRegistry;
pub use runtime_enforcement::{PLUGIN_NAME, RuntimeEnforcement};
