use async_trait::async_trait;
use k8s_openapi::api::node::v1::RuntimeClass;
use kube::Client;
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams};
use kube::discovery::ApiResource;

#[cfg(test)]
use mockall::automock;

/// API group of the OpenShift `ClusterVersion` resource
pub const CLUSTER_VERSION_GROUP: &str = "config.openshift.io";
pub const CLUSTER_VERSION_VERSION: &str = "v1";
pub const CLUSTER_VERSION_KIND: &str = "ClusterVersion";
pub const CLUSTER_VERSION_PLURAL: &str = "clusterversions";

/// Read-only view of the cluster API consulted during admission
///
/// Implemented by [`KubeClusterReader`] in production; tests substitute their
/// own implementation to simulate missing kinds, empty lists and transport
/// failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Lists `config.openshift.io/v1` `ClusterVersion` objects and returns how many were seen
    ///
    /// A cluster without the kind answers with a 404 on the collection.
    async fn list_cluster_versions(&self) -> kube::Result<usize>;

    /// Fetches a cluster-scoped `RuntimeClass` by name
    async fn get_runtime_class(&self, name: &str) -> kube::Result<RuntimeClass>;
}

/// [`ClusterReader`] backed by a shared kube [`Client`]
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
    cluster_versions: ApiResource,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(
            CLUSTER_VERSION_GROUP,
            CLUSTER_VERSION_VERSION,
            CLUSTER_VERSION_KIND,
        );
        let cluster_versions = ApiResource::from_gvk_with_plural(&gvk, CLUSTER_VERSION_PLURAL);

        Self {
            client,
            cluster_versions,
        }
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list_cluster_versions(&self) -> kube::Result<usize> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.cluster_versions);
        // one item is enough to tell the distributions apart
        let list = api.list(&ListParams::default().limit(1)).await?;
        Ok(list.items.len())
    }

    async fn get_runtime_class(&self, name: &str) -> kube::Result<RuntimeClass> {
        let api: Api<RuntimeClass> = Api::all(self.client.clone());
        api.get(name).await
    }
}

/// Whether the API server answered 404, either for a missing object or an unknown kind
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}
