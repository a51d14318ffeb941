use thiserror::Error;

/// Errors that can occur while admitting a pod
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the Kubernetes client, passed through untouched
    #[error(transparent)]
    Kube(#[from] kube::Error),

    /// Listing `ClusterVersion` objects failed for a reason other than the kind being unknown
    #[error("failed to determine if running on openshift or not: {0}")]
    EnvironmentDetection(#[source] kube::Error),

    /// The configured GPU runtime class is not present in the cluster
    #[error("cannot set runtimeClassName: runtimeClass '{0}' does not exist")]
    RuntimeClassNotFound(String),

    /// The caller's deadline elapsed before a cluster call completed
    #[error("deadline exceeded while waiting for the cluster API")]
    DeadlineExceeded,

    /// The caller cancelled the admission request
    #[error("admission request cancelled")]
    Cancelled,

    /// A plugin in the pipeline rejected or failed to process the pod
    #[error("{plugin}: {source}")]
    PluginFailed {
        plugin: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Error during JSON serialization/deserialization
    #[error("SerializationError: {0}")]
    SerializationError(#[source] serde_json::Error),

    /// The computed JSON patch could not be attached to the admission response
    #[error("PatchError: {0}")]
    Patch(#[source] kube::core::admission::SerializePatchError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for admission operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
