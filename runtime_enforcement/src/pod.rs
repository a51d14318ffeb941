//! Pod predicates consumed by the enforcement plugin
//!
//! Both predicates are pure functions over the pod as submitted.

use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Whole-device GPU resource name
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";
/// Prefix of MIG slice resource names, e.g. `nvidia.com/mig-1g.5gb`
pub const MIG_RESOURCE_PREFIX: &str = "nvidia.com/mig-";
/// Annotation carrying a fractional GPU request, e.g. `"0.5"`
pub const GPU_FRACTION_ANNOTATION: &str = "gpu-fraction";
/// Annotation carrying a GPU memory request
pub const GPU_MEMORY_ANNOTATION: &str = "gpu-memory";
/// Runtime class used when none is configured
pub const DEFAULT_RUNTIME_CLASS_NAME: &str = "nvidia";
/// Namespace holding GPU reservation pods
pub const RESERVATION_NAMESPACE: &str = "kai-resource-reservation";
pub const APP_LABEL: &str = "app";
pub const RESERVATION_APP_LABEL_VALUE: &str = "kai-resource-reservation";

/// Classifies pods for runtime-class enforcement
pub trait PodClassifier: Send + Sync {
    /// Whether the pod asks for a whole, fractional or MIG GPU
    fn requests_gpu(&self, pod: &Pod) -> bool;

    /// Whether the pod is a system pod holding GPU capacity
    fn is_gpu_reservation_pod(&self, pod: &Pod) -> bool;
}

/// Default classifier using the annotations and resource names above
#[derive(Clone, Copy, Debug, Default)]
pub struct GpuPodClassifier;

impl PodClassifier for GpuPodClassifier {
    fn requests_gpu(&self, pod: &Pod) -> bool {
        requests_gpu(pod)
    }

    fn is_gpu_reservation_pod(&self, pod: &Pod) -> bool {
        is_gpu_reservation_pod(pod)
    }
}

pub fn requests_gpu(pod: &Pod) -> bool {
    let annotated = pod.metadata.annotations.as_ref().is_some_and(|annotations| {
        annotations.contains_key(GPU_FRACTION_ANNOTATION)
            || annotations.contains_key(GPU_MEMORY_ANNOTATION)
    });
    if annotated {
        return true;
    }

    pod.spec
        .iter()
        .flat_map(|spec| spec.containers.iter().chain(spec.init_containers.iter().flatten()))
        .any(container_requests_gpu)
}

pub fn is_gpu_reservation_pod(pod: &Pod) -> bool {
    let in_namespace = pod.metadata.namespace.as_deref() == Some(RESERVATION_NAMESPACE);
    let labelled = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(APP_LABEL))
        .is_some_and(|value| value == RESERVATION_APP_LABEL_VALUE);

    in_namespace && labelled
}

fn container_requests_gpu(container: &Container) -> bool {
    let Some(resources) = &container.resources else {
        return false;
    };

    [&resources.limits, &resources.requests]
        .into_iter()
        .flatten()
        .flat_map(|list| list.iter())
        .any(|(name, quantity)| is_gpu_resource(name) && !is_zero(quantity))
}

fn is_gpu_resource(name: &str) -> bool {
    name == GPU_RESOURCE || name.starts_with(MIG_RESOURCE_PREFIX)
}

// Unparseable quantities count as a request; the API server rejects them later anyway.
fn is_zero(quantity: &Quantity) -> bool {
    let number = quantity
        .0
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_alphabetic());

    number.parse::<f64>().is_ok_and(|value| value == 0.0)
}
