//! Shared fixtures for unit tests

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ResourceRequirements};
use k8s_openapi::api::node::v1::RuntimeClass;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;

use crate::cluster::MockClusterReader;
use crate::pod::{
    APP_LABEL, GPU_FRACTION_ANNOTATION, GPU_RESOURCE, RESERVATION_APP_LABEL_VALUE,
    RESERVATION_NAMESPACE,
};

/// How the fake API server answers the `ClusterVersion` list
#[derive(Clone, Copy, Debug)]
pub(crate) enum Distribution {
    /// Kind unknown to the API server
    Vanilla,
    /// Kind registered, no objects
    EmptyClusterVersions,
    OpenShift,
}

pub(crate) fn not_found() -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "the server could not find the requested resource".to_string(),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

pub(crate) fn forbidden() -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "clusterversions.config.openshift.io is forbidden".to_string(),
        reason: "Forbidden".to_string(),
        code: 403,
    })
}

pub(crate) fn transport_error() -> kube::Error {
    kube::Error::Service("connection refused".into())
}

pub(crate) fn runtime_class(name: &str) -> RuntimeClass {
    RuntimeClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        handler: name.to_string(),
        ..Default::default()
    }
}

/// Mock cluster answering the environment check per `distribution` and
/// holding the given runtime classes
pub(crate) fn cluster(distribution: Distribution, runtime_classes: &[&str]) -> MockClusterReader {
    let mut mock = MockClusterReader::new();
    mock.expect_list_cluster_versions()
        .returning(move || match distribution {
            Distribution::Vanilla => Err(not_found()),
            Distribution::EmptyClusterVersions => Ok(0),
            Distribution::OpenShift => Ok(1),
        });

    let runtime_classes: Vec<String> = runtime_classes.iter().map(ToString::to_string).collect();
    mock.expect_get_runtime_class().returning(move |name| {
        if runtime_classes.iter().any(|rc| rc == name) {
            Ok(runtime_class(name))
        } else {
            Err(not_found())
        }
    });

    mock
}

pub(crate) fn plain_pod() -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("plain".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                image: Some("busybox".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn whole_gpu_pod() -> Pod {
    let mut pod = plain_pod();
    pod.metadata.name = Some("whole-gpu".to_string());
    if let Some(spec) = pod.spec.as_mut() {
        spec.containers[0].resources = Some(ResourceRequirements {
            limits: Some(BTreeMap::from([(
                GPU_RESOURCE.to_string(),
                Quantity("1".to_string()),
            )])),
            ..Default::default()
        });
    }
    pod
}

pub(crate) fn fractional_gpu_pod() -> Pod {
    let mut pod = plain_pod();
    pod.metadata.name = Some("fractional-gpu".to_string());
    pod.metadata.annotations = Some(BTreeMap::from([(
        GPU_FRACTION_ANNOTATION.to_string(),
        "0.5".to_string(),
    )]));
    pod
}

pub(crate) fn reservation_pod() -> Pod {
    let mut pod = whole_gpu_pod();
    pod.metadata.name = Some("gpu-reservation-node-1-abcde".to_string());
    pod.metadata.namespace = Some(RESERVATION_NAMESPACE.to_string());
    pod.metadata.labels = Some(BTreeMap::from([(
        APP_LABEL.to_string(),
        RESERVATION_APP_LABEL_VALUE.to_string(),
    )]));
    pod
}
