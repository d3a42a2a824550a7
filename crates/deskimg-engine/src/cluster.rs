//! Cluster API access for one-time migration cleanup.

use crate::ImageError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Service,
    DaemonSet,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Service => f.write_str("service"),
            ResourceKind::DaemonSet => f.write_str("daemon-set"),
        }
    }
}

/// The slice of the cluster API the engine needs: namespaced list-by-label
/// and delete-by-name.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Names of the objects of `kind` in `namespace` matching `label_selector`.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, ImageError>;

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str)
        -> Result<(), ImageError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// `kind namespace/name` of every object removed.
    pub deleted: Vec<String>,
    /// `kind namespace/name` of every object that could not be removed, or
    /// `kind namespace/*` when the listing itself failed.
    pub failed: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every service, then every daemon set, in `namespace` that matches
/// `label_selector`. Never fails: each problem is logged and recorded in the
/// report, and the remaining objects are still attempted.
pub async fn remove_labelled(
    cluster: &dyn ClusterClient,
    namespace: &str,
    label_selector: &str,
) -> CleanupReport {
    let mut report = CleanupReport::default();

    for kind in [ResourceKind::Service, ResourceKind::DaemonSet] {
        let names = match cluster.list(kind, namespace, label_selector).await {
            Ok(names) => names,
            Err(e) => {
                warn!("failed to list {kind} in {namespace} ({label_selector}): {e}");
                report.failed.push(format!("{kind} {namespace}/*"));
                continue;
            }
        };

        for name in names.into_iter().filter(|n| !n.is_empty()) {
            let label = format!("{kind} {namespace}/{name}");
            match cluster.delete(kind, namespace, &name).await {
                Ok(()) => {
                    info!("deleted {label}");
                    report.deleted.push(label);
                }
                Err(e) => {
                    warn!("failed to delete {label}: {e}");
                    report.failed.push(label);
                }
            }
        }
    }

    report
}

#[cfg(feature = "kube")]
pub use kube_client::KubeClusterClient;

#[cfg(feature = "kube")]
mod kube_client {
    use super::{ClusterClient, ResourceKind};
    use crate::ImageError;
    use async_trait::async_trait;
    use k8s_openapi::api::apps::v1::DaemonSet;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::{Api, DeleteParams, ListParams};
    use kube::config::KubeConfigOptions;

    fn cluster_err(e: impl std::fmt::Display) -> ImageError {
        ImageError::Cluster(e.to_string())
    }

    /// [`ClusterClient`] backed by a kube-rs client.
    #[derive(Clone)]
    pub struct KubeClusterClient {
        client: kube::Client,
    }

    impl KubeClusterClient {
        pub fn new(client: kube::Client) -> Self {
            Self { client }
        }

        /// Connect using a named context from the user's kubeconfig.
        pub async fn for_context(context: &str) -> Result<Self, ImageError> {
            let options = KubeConfigOptions {
                context: Some(context.to_owned()),
                ..KubeConfigOptions::default()
            };
            let config = kube::Config::from_kubeconfig(&options)
                .await
                .map_err(cluster_err)?;
            let client = kube::Client::try_from(config).map_err(cluster_err)?;
            Ok(Self::new(client))
        }
    }

    #[async_trait]
    impl ClusterClient for KubeClusterClient {
        async fn list(
            &self,
            kind: ResourceKind,
            namespace: &str,
            label_selector: &str,
        ) -> Result<Vec<String>, ImageError> {
            let params = ListParams::default().labels(label_selector);
            let names = match kind {
                ResourceKind::Service => Api::<Service>::namespaced(self.client.clone(), namespace)
                    .list(&params)
                    .await
                    .map_err(cluster_err)?
                    .items
                    .into_iter()
                    .filter_map(|s| s.metadata.name)
                    .collect(),
                ResourceKind::DaemonSet => {
                    Api::<DaemonSet>::namespaced(self.client.clone(), namespace)
                        .list(&params)
                        .await
                        .map_err(cluster_err)?
                        .items
                        .into_iter()
                        .filter_map(|d| d.metadata.name)
                        .collect()
                }
            };
            Ok(names)
        }

        async fn delete(
            &self,
            kind: ResourceKind,
            namespace: &str,
            name: &str,
        ) -> Result<(), ImageError> {
            let params = DeleteParams::default();
            match kind {
                ResourceKind::Service => {
                    Api::<Service>::namespaced(self.client.clone(), namespace)
                        .delete(name, &params)
                        .await
                        .map_err(cluster_err)?;
                }
                ResourceKind::DaemonSet => {
                    Api::<DaemonSet>::namespaced(self.client.clone(), namespace)
                        .delete(name, &params)
                        .await
                        .map_err(cluster_err)?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    const NS: &str = "kube-image";
    const SELECTOR: &str = "app.kubernetes.io/managed-by=kim";

    #[tokio::test]
    async fn one_failed_delete_does_not_stop_the_rest() {
        let cluster = MockCluster::new();
        cluster.insert(ResourceKind::Service, NS, "builder");
        cluster.insert(ResourceKind::Service, NS, "stuck");
        cluster.insert(ResourceKind::DaemonSet, NS, "builder");
        cluster.fail_delete("stuck");

        let report = remove_labelled(&cluster, NS, SELECTOR).await;

        assert!(!cluster.contains(ResourceKind::Service, NS, "builder"));
        assert!(cluster.contains(ResourceKind::Service, NS, "stuck"));
        assert!(!cluster.contains(ResourceKind::DaemonSet, NS, "builder"));
        assert_eq!(report.failed, vec!["service kube-image/stuck"]);
        assert_eq!(report.deleted.len(), 2);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn failed_listing_skips_only_that_kind() {
        let cluster = MockCluster::new();
        cluster.insert(ResourceKind::Service, NS, "builder");
        cluster.insert(ResourceKind::DaemonSet, NS, "builder");
        cluster.fail_list(ResourceKind::Service);

        let report = remove_labelled(&cluster, NS, SELECTOR).await;

        assert!(cluster.contains(ResourceKind::Service, NS, "builder"));
        assert!(!cluster.contains(ResourceKind::DaemonSet, NS, "builder"));
        assert_eq!(report.failed, vec!["service kube-image/*"]);
    }

    #[tokio::test]
    async fn other_namespaces_untouched() {
        let cluster = MockCluster::new();
        cluster.insert(ResourceKind::Service, "default", "builder");

        let report = remove_labelled(&cluster, NS, SELECTOR).await;

        assert!(report.is_clean());
        assert!(report.deleted.is_empty());
        assert!(cluster.contains(ResourceKind::Service, "default", "builder"));
    }

    #[tokio::test]
    async fn repeated_cleanup_is_idempotent() {
        let cluster = MockCluster::new();
        cluster.insert(ResourceKind::DaemonSet, NS, "builder");

        let first = remove_labelled(&cluster, NS, SELECTOR).await;
        let second = remove_labelled(&cluster, NS, SELECTOR).await;

        assert_eq!(first.deleted, vec!["daemon-set kube-image/builder"]);
        assert_eq!(second, CleanupReport::default());
    }
}
