use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::cluster::ClusterReader;
use crate::config::{Config, MissingRuntimeClassPolicy};
use crate::environment::EnvironmentDetector;
use crate::plugin::PodPlugin;
use crate::pod::{GpuPodClassifier, PodClassifier};
use crate::registry::RuntimeClassRegistry;
use crate::{Context, Error, Result};

pub const PLUGIN_NAME: &str = "runtimeenforcement";

/// Attaches the GPU runtime class to pods requesting GPUs
///
/// Checks run in a fixed order and stop at the first that decides the outcome:
///
/// 1. OpenShift clusters are left alone, the platform picks the GPU runtime itself.
/// 2. GPU reservation pods keep their own runtime class.
/// 3. Pods without a GPU request are left alone.
/// 4. If the configured runtime class exists, `spec.runtimeClassName` is set to it.
///    If it does not, the [`MissingRuntimeClassPolicy`] decides between rejecting
///    the pod and admitting it unchanged.
///
/// The pod is never touched on an error path.
pub struct RuntimeEnforcement {
    detector: EnvironmentDetector,
    registry: RuntimeClassRegistry,
    classifier: Arc<dyn PodClassifier>,
    runtime_class_name: String,
    missing_runtime_class: MissingRuntimeClassPolicy,
}

impl RuntimeEnforcement {
    pub fn new(cluster: Arc<dyn ClusterReader>, config: &Config) -> Self {
        Self {
            detector: EnvironmentDetector::new(cluster.clone()),
            registry: RuntimeClassRegistry::new(cluster),
            classifier: Arc::new(GpuPodClassifier),
            runtime_class_name: config.runtime_class_name().to_string(),
            missing_runtime_class: config.missing_runtime_class_policy(),
        }
    }

    /// Replaces the GPU request and reservation pod predicates
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl PodClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn runtime_class_name(&self) -> &str {
        &self.runtime_class_name
    }

    pub const fn missing_runtime_class_policy(&self) -> MissingRuntimeClassPolicy {
        self.missing_runtime_class
    }
}

#[async_trait]
impl PodPlugin for RuntimeEnforcement {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    async fn validate(&self, _ctx: &Context, _pod: &Pod) -> Result<()> {
        Ok(())
    }

    async fn mutate(&self, ctx: &Context, pod: &mut Pod) -> Result<()> {
        let name = pod.name_any();

        if self.detector.detect(ctx).await?.is_platform_variant() {
            debug!(pod = %name, "openshift manages the gpu runtime, skipping");
            return Ok(());
        }

        // reservation pods carry their own runtime class
        if self.classifier.is_gpu_reservation_pod(pod) {
            debug!(pod = %name, "gpu reservation pod, skipping");
            return Ok(());
        }

        if !self.classifier.requests_gpu(pod) {
            return Ok(());
        }

        if !self.registry.exists(ctx, &self.runtime_class_name).await? {
            return match self.missing_runtime_class {
                MissingRuntimeClassPolicy::Reject => {
                    Err(Error::RuntimeClassNotFound(self.runtime_class_name.clone()))
                }
                MissingRuntimeClassPolicy::Skip => {
                    warn!(
                        pod = %name,
                        runtime_class = %self.runtime_class_name,
                        "runtime class does not exist, admitting gpu pod without it"
                    );
                    Ok(())
                }
            };
        }

        if set_runtime_class(pod, &self.runtime_class_name) {
            info!(pod = %name, runtime_class = %self.runtime_class_name, "set runtime class");
        } else {
            debug!(pod = %name, "pod has no spec, skipping");
        }

        Ok(())
    }
}

// a pod without a spec is left as is rather than given an empty one
fn set_runtime_class(pod: &mut Pod, runtime_class_name: &str) -> bool {
    match pod.spec.as_mut() {
        Some(spec) => {
            spec.runtime_class_name = Some(runtime_class_name.to_string());
            true
        }
        None => false,
    }
}
