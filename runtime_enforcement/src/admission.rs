//! Bridge between Kubernetes `AdmissionReview` requests and the pod [`Pipeline`]

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use tracing::{error, info, warn};

use crate::{Context, Error, Pipeline, Result};

type RouteFuture = Pin<Box<dyn Future<Output = Result<warp::reply::Json, Infallible>> + Send>>;

/// Creates a warp route handler for the mutating webhook
///
/// Each review is admitted under a fresh [`Context`] expiring after `timeout`.
pub fn mutating_route(
    pipeline: Arc<Pipeline>,
    timeout: Duration,
) -> impl Fn(AdmissionReview<DynamicObject>) -> RouteFuture + Clone {
    move |body: AdmissionReview<DynamicObject>| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            let req: AdmissionRequest<_> = match body.try_into() {
                Ok(req) => req,
                Err(err) => {
                    error!("invalid admission request: {}", err);
                    return Ok(warp::reply::json(
                        &AdmissionResponse::invalid(err.to_string()).into_review(),
                    ));
                }
            };

            let ctx = Context::with_timeout(timeout);
            let res = mutate(&pipeline, &ctx, &req).await;
            Ok(warp::reply::json(&res.into_review()))
        })
    }
}

/// Creates a warp route handler for the validating webhook
pub fn validating_route(
    pipeline: Arc<Pipeline>,
    timeout: Duration,
) -> impl Fn(AdmissionReview<DynamicObject>) -> RouteFuture + Clone {
    move |body: AdmissionReview<DynamicObject>| {
        let pipeline = pipeline.clone();
        Box::pin(async move {
            let req: AdmissionRequest<_> = match body.try_into() {
                Ok(req) => req,
                Err(err) => {
                    error!("invalid admission request: {}", err);
                    return Ok(warp::reply::json(
                        &AdmissionResponse::invalid(err.to_string()).into_review(),
                    ));
                }
            };

            let ctx = Context::with_timeout(timeout);
            let res = validate(&pipeline, &ctx, &req).await;
            Ok(warp::reply::json(&res.into_review()))
        })
    }
}

/// Runs the full pipeline on a pod creation request
///
/// The response carries a JSON patch with whatever the plugins changed. Other
/// kinds and operations are allowed untouched.
pub async fn mutate(
    pipeline: &Pipeline,
    ctx: &Context,
    req: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let res = AdmissionResponse::from(req);
    let Some(original) = review_pod(req) else {
        return res;
    };
    let original = match original {
        Ok(pod) => pod,
        Err(err) => {
            error!(error = %err, "failed to decode pod");
            return res.deny(err.to_string());
        }
    };

    let name = original.name_any();
    let mut pod = original.clone();
    if let Err(err) = pipeline.admit(ctx, &mut pod).await {
        warn!(pod = %name, operation = ?req.operation, error = %err, "admission denied");
        return res.deny(err.to_string());
    }

    let patch = match pod_patch(&original, &pod) {
        Ok(patch) => patch,
        Err(err) => {
            error!(pod = %name, error = %err, "failed to compute patch");
            return res.deny(err.to_string());
        }
    };
    if patch.0.is_empty() {
        return res;
    }

    match res.with_patch(patch) {
        Ok(res) => {
            info!(pod = %name, operation = ?req.operation, "mutated pod");
            res
        }
        Err(err) => {
            let err = Error::Patch(err);
            error!(pod = %name, error = %err, "failed to attach patch");
            AdmissionResponse::from(req).deny(err.to_string())
        }
    }
}

/// Runs every plugin's validation on a pod creation request
pub async fn validate(
    pipeline: &Pipeline,
    ctx: &Context,
    req: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let res = AdmissionResponse::from(req);
    let pod = match review_pod(req) {
        None => return res,
        Some(Ok(pod)) => pod,
        Some(Err(err)) => return res.deny(err.to_string()),
    };

    match pipeline.validate(ctx, &pod).await {
        Ok(()) => {
            info!(pod = %pod.name_any(), operation = ?req.operation, "validation passed");
            res
        }
        Err(err) => {
            warn!(pod = %pod.name_any(), operation = ?req.operation, error = %err, "validation denied");
            res.deny(err.to_string())
        }
    }
}

/// Extracts the pod from a `CREATE` request for a core/v1 pod
///
/// Returns `None` when the request is out of scope for the pipeline.
pub fn review_pod(req: &AdmissionRequest<DynamicObject>) -> Option<Result<Pod>> {
    if !matches!(req.operation, Operation::Create) {
        return None;
    }
    if !req.kind.group.is_empty() || req.kind.kind != "Pod" {
        return None;
    }

    let obj = req.object.as_ref()?;
    Some(
        serde_json::to_value(obj)
            .and_then(serde_json::from_value::<Pod>)
            .map_err(Error::SerializationError),
    )
}

fn pod_patch(original: &Pod, mutated: &Pod) -> Result<json_patch::Patch> {
    let original = serde_json::to_value(original).map_err(Error::SerializationError)?;
    let mutated = serde_json::to_value(mutated).map_err(Error::SerializationError)?;
    Ok(json_patch::diff(&original, &mutated))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::pod::{DEFAULT_RUNTIME_CLASS_NAME, GPU_RESOURCE};
    use crate::testing::{Distribution, cluster};
    use crate::{Config, RuntimeEnforcement};

    fn pipeline(distribution: Distribution, runtime_classes: &[&str]) -> Pipeline {
        let config = Config::default().with_runtime_class_name(DEFAULT_RUNTIME_CLASS_NAME);
        let plugin = RuntimeEnforcement::new(Arc::new(cluster(distribution, runtime_classes)), &config);
        Pipeline::builder().plugin(plugin).build()
    }

    fn review(operation: &str, object: Value) -> AdmissionReview<DynamicObject> {
        let kind = object["kind"].as_str().unwrap_or_default().to_string();
        serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "test-uid",
                "kind": {"group": "", "version": "v1", "kind": kind},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": object["metadata"]["name"],
                "namespace": "default",
                "operation": operation,
                "userInfo": {},
                "object": object,
            }
        }))
        .unwrap()
    }

    fn create_test_request(operation: &str, object: Value) -> AdmissionRequest<DynamicObject> {
        review(operation, object).try_into().unwrap()
    }

    fn pod_object(name: &str, gpus: Option<&str>) -> Value {
        let resources = gpus.map_or_else(|| json!({}), |n| json!({"limits": {GPU_RESOURCE: n}}));
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": "default"},
            "spec": {
                "containers": [{"name": "main", "image": "busybox", "resources": resources}]
            }
        })
    }

    fn patch_ops(res: &AdmissionResponse) -> Vec<Value> {
        serde_json::from_slice(res.patch.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_gpu_pod_gets_runtime_class_patch() {
        let req = create_test_request("CREATE", pod_object("gpu-pod", Some("1")));
        let res = mutate(
            &pipeline(Distribution::Vanilla, &[DEFAULT_RUNTIME_CLASS_NAME]),
            &Context::default(),
            &req,
        )
        .await;

        assert!(res.allowed);
        assert_eq!(
            patch_ops(&res),
            vec![json!({"op": "add", "path": "/spec/runtimeClassName", "value": DEFAULT_RUNTIME_CLASS_NAME})]
        );
    }

    #[tokio::test]
    async fn test_plain_pod_has_no_patch() {
        let req = create_test_request("CREATE", pod_object("plain-pod", None));
        let res = mutate(
            &pipeline(Distribution::Vanilla, &[DEFAULT_RUNTIME_CLASS_NAME]),
            &Context::default(),
            &req,
        )
        .await;

        assert!(res.allowed);
        assert!(res.patch.is_none(), "Should not have patches for plain-pod");
    }

    #[tokio::test]
    async fn test_missing_runtime_class_denies_with_plugin_name() {
        let req = create_test_request("CREATE", pod_object("gpu-pod", Some("1")));
        let res = mutate(
            &pipeline(Distribution::Vanilla, &[]),
            &Context::default(),
            &req,
        )
        .await;

        assert!(!res.allowed);
        assert!(res.patch.is_none());
        assert_eq!(
            res.result.message,
            "runtimeenforcement: cannot set runtimeClassName: runtimeClass 'nvidia' does not exist"
        );
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_denial_is_logged_once() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let req = create_test_request("CREATE", pod_object("gpu-pod", Some("1")));
        let res = mutate(
            &pipeline(Distribution::Vanilla, &[]),
            &Context::default(),
            &req,
        )
        .await;
        assert!(!res.allowed);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let denials: Vec<&str> = output.lines().filter(|line| line.contains("WARN")).collect();
        assert_eq!(denials.len(), 1, "{output}");
        assert!(denials[0].contains("admission denied"));
    }

    #[tokio::test]
    async fn test_update_and_other_kinds_pass_through() {
        let pipeline = pipeline(Distribution::Vanilla, &[]);

        let req = create_test_request("UPDATE", pod_object("gpu-pod", Some("1")));
        assert!(review_pod(&req).is_none());
        let res = mutate(&pipeline, &Context::default(), &req).await;
        assert!(res.allowed);

        let config_map = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "default"},
            "data": {"key": "value"}
        });
        let req = create_test_request("CREATE", config_map);
        assert!(review_pod(&req).is_none());
        let res = mutate(&pipeline, &Context::default(), &req).await;
        assert!(res.allowed);
        assert!(res.patch.is_none());
    }

    #[tokio::test]
    async fn test_validate_allows() {
        let req = create_test_request("CREATE", pod_object("gpu-pod", Some("1")));
        let res = validate(
            &pipeline(Distribution::Vanilla, &[]),
            &Context::default(),
            &req,
        )
        .await;
        assert!(res.allowed);
    }

    #[tokio::test]
    async fn test_mutating_route_replies() {
        let route = mutating_route(
            Arc::new(pipeline(Distribution::OpenShift, &[DEFAULT_RUNTIME_CLASS_NAME])),
            Duration::from_secs(10),
        );

        let reply = route(review("CREATE", pod_object("gpu-pod", Some("1"))))
            .await
            .unwrap();
        let response = warp::Reply::into_response(reply);
        assert_eq!(response.status(), warp::http::StatusCode::OK);
    }
}
