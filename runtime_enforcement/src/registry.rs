use std::sync::Arc;

use crate::cluster::{ClusterReader, is_not_found};
use crate::{Context, Result};

/// Answers whether a `RuntimeClass` exists in the cluster
///
/// Nothing is cached; every call asks the API server.
#[derive(Clone)]
pub struct RuntimeClassRegistry {
    cluster: Arc<dyn ClusterReader>,
}

impl RuntimeClassRegistry {
    pub fn new(cluster: Arc<dyn ClusterReader>) -> Self {
        Self { cluster }
    }

    /// Returns `false` when the API server reports the runtime class as not found
    pub async fn exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        match ctx.run(self.cluster.get_runtime_class(name)).await? {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
