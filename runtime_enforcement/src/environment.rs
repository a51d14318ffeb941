use std::sync::Arc;

use tracing::debug;

use crate::cluster::{ClusterReader, is_not_found};
use crate::{Context, Error, Result};

/// Kubernetes distribution the webhook is running against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterEnvironment {
    /// OpenShift, which selects the GPU runtime on its own
    PlatformVariant,
    /// Any other distribution
    Vanilla,
}

impl ClusterEnvironment {
    pub const fn is_platform_variant(self) -> bool {
        matches!(self, Self::PlatformVariant)
    }
}

/// Tells OpenShift clusters apart from vanilla Kubernetes
///
/// The answer is recomputed on every call.
#[derive(Clone)]
pub struct EnvironmentDetector {
    cluster: Arc<dyn ClusterReader>,
}

impl EnvironmentDetector {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }

    /// Detects the cluster environment by listing `ClusterVersion` objects
    ///
    /// An unknown kind or an empty list means vanilla; at least one object means
    /// OpenShift. Other API failures are wrapped in [`Error::EnvironmentDetection`].
    pub async fn detect(&self, ctx: &Context) -> Result<ClusterEnvironment> {
        let environment = match ctx.run(self.cluster.list_cluster_versions()).await? {
            Ok(0) => ClusterEnvironment::Vanilla,
            Ok(_) => ClusterEnvironment::PlatformVariant,
            Err(err) if is_not_found(&err) => ClusterEnvironment::Vanilla,
            Err(err) => return Err(Error::EnvironmentDetection(err)),
        };

        debug!(environment = ?environment, "detected cluster environment");
        Ok(environment)
    }
}
