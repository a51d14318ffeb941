use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;

use crate::{Context, Error, Result};

/// Admission plugin operating on pods
///
/// A plugin exposes the conventional admission capability set: a stable name,
/// a validating step and a mutating step. Both steps receive the request
/// [`Context`] and must route every cluster call through it.
#[async_trait]
pub trait PodPlugin: Send + Sync {
    /// Returns the name of this plugin for logging and error messages
    fn name(&self) -> &'static str;

    /// Validates the pod without changing it
    ///
    /// Returning an error rejects the pod.
    async fn validate(&self, ctx: &Context, pod: &Pod) -> Result<()>;

    /// Mutates the pod in place
    ///
    /// Returning an error rejects the pod; the pipeline discards any partial
    /// changes made before the error.
    async fn mutate(&self, ctx: &Context, pod: &mut Pod) -> Result<()>;
}

/// Ordered collection of pod plugins applied uniformly to each request
pub struct Pipeline {
    plugins: Vec<Box<dyn PodPlugin>>,
}

impl Pipeline {
    /// Start building a Pipeline
    #[must_use]
    pub const fn builder() -> PipelineBuilder {
        PipelineBuilder {
            plugins: Vec::new(),
        }
    }

    /// Names of the registered plugins in invocation order
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    /// Runs every plugin's `validate` in order, stopping at the first failure
    pub async fn validate(&self, ctx: &Context, pod: &Pod) -> Result<()> {
        for plugin in &self.plugins {
            if let Err(err) = plugin.validate(ctx, pod).await {
                return Err(Error::PluginFailed {
                    plugin: plugin.name(),
                    source: Box::new(err),
                });
            }
        }

        Ok(())
    }

    /// Runs every plugin's `mutate` in order against a working copy
    ///
    /// `pod` is only replaced once all plugins succeed.
    pub async fn mutate(&self, ctx: &Context, pod: &mut Pod) -> Result<()> {
        let mut candidate = pod.clone();

        for plugin in &self.plugins {
            if let Err(err) = plugin.mutate(ctx, &mut candidate).await {
                return Err(Error::PluginFailed {
                    plugin: plugin.name(),
                    source: Box::new(err),
                });
            }
            debug!(plugin = plugin.name(), pod = %pod.name_any(), "mutation done");
        }

        *pod = candidate;
        Ok(())
    }

    /// Validates and then mutates the pod
    pub async fn admit(&self, ctx: &Context, pod: &mut Pod) -> Result<()> {
        self.validate(ctx, pod).await?;
        self.mutate(ctx, pod).await
    }
}

#[doc(hidden)]
pub struct PipelineBuilder {
    plugins: Vec<Box<dyn PodPlugin>>,
}

impl PipelineBuilder {
    /// Appends a plugin
    ///
    /// Plugins run in registration order.
    #[must_use]
    pub fn plugin(mut self, plugin: impl PodPlugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            plugins: self.plugins,
        }
    }
}
