use crate::backend::ImageBackend;
use crate::cluster::{remove_labelled, CleanupReport, ClusterClient};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// BuildKit daemon socket inside the VM.
pub const BUILDKIT_HOST: &str = "unix:///run/buildkit/buildkitd.sock";

/// Namespace and selector of the builder deployed by releases before 1.0.
pub const LEGACY_BUILDER_NAMESPACE: &str = "kube-image";
pub const LEGACY_BUILDER_SELECTOR: &str = "app.kubernetes.io/managed-by=kim";

#[derive(Debug, Clone, Copy, Default)]
pub struct NerdctlBackend;

impl NerdctlBackend {
    pub fn new() -> Self {
        Self
    }

    /// `--namespace <ns>` followed by `rest`.
    fn namespaced(namespace: &str, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(rest.len() + 2);
        args.push("--namespace".to_owned());
        args.push(namespace.to_owned());
        args.extend(rest.iter().map(|s| (*s).to_owned()));
        args
    }
}

#[async_trait]
impl ImageBackend for NerdctlBackend {
    fn name(&self) -> &'static str {
        "nerdctl"
    }

    fn build_args(
        &self,
        namespace: &str,
        context_dir: &Path,
        file: &Path,
        tagged_name: &str,
    ) -> Vec<String> {
        let context = context_dir.to_string_lossy();
        let dockerfile = context_dir.join(file);
        let dockerfile = dockerfile.to_string_lossy();
        Self::namespaced(
            namespace,
            &[
                "build",
                "--buildkit-host",
                BUILDKIT_HOST,
                "--file",
                &*dockerfile,
                "--tag",
                tagged_name,
                &*context,
            ],
        )
    }

    fn pull_args(&self, namespace: &str, tagged_name: &str) -> Vec<String> {
        Self::namespaced(namespace, &["pull", tagged_name, "--debug"])
    }

    fn push_args(&self, namespace: &str, tagged_name: &str) -> Vec<String> {
        Self::namespaced(namespace, &["push", tagged_name])
    }

    fn delete_args(&self, namespace: &str, image_id: &str) -> Vec<String> {
        Self::namespaced(namespace, &["rmi", image_id])
    }

    fn list_args(&self, namespace: &str) -> Vec<String> {
        Self::namespaced(namespace, &["images", "--format", "{{json .}}"])
    }

    fn namespaces_args(&self, namespace: &str) -> Vec<String> {
        Self::namespaced(namespace, &["namespace", "list", "--quiet"])
    }

    async fn remove_legacy_builder(&self, cluster: &dyn ClusterClient) -> CleanupReport {
        info!("removing legacy builder resources from {LEGACY_BUILDER_NAMESPACE}");
        remove_labelled(cluster, LEGACY_BUILDER_NAMESPACE, LEGACY_BUILDER_SELECTOR).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ResourceKind;
    use crate::mock::MockCluster;
    use std::path::PathBuf;

    #[test]
    fn every_command_starts_with_namespace() {
        let b = NerdctlBackend::new();
        let ctx = PathBuf::from("/src/app");
        let all = [
            b.build_args("foo", &ctx, Path::new("Dockerfile"), "app:1"),
            b.pull_args("foo", "alpine"),
            b.push_args("foo", "registry.local/app:1"),
            b.delete_args("foo", "55fe4b211a51"),
            b.list_args("foo"),
            b.namespaces_args("foo"),
        ];
        for args in &all {
            assert_eq!(&args[..2], ["--namespace", "foo"], "{args:?}");
        }
    }

    #[test]
    fn build_args_layout() {
        let args = NerdctlBackend.build_args(
            "k8s.io",
            Path::new("/src/app"),
            Path::new("docker/Dockerfile.dev"),
            "app:dev",
        );
        assert_eq!(
            args,
            vec![
                "--namespace",
                "k8s.io",
                "build",
                "--buildkit-host",
                "unix:///run/buildkit/buildkitd.sock",
                "--file",
                "/src/app/docker/Dockerfile.dev",
                "--tag",
                "app:dev",
                "/src/app",
            ]
        );
    }

    #[test]
    fn passthrough_args() {
        let b = NerdctlBackend;
        assert_eq!(
            b.pull_args("k8s.io", "nginx:latest"),
            vec!["--namespace", "k8s.io", "pull", "nginx:latest", "--debug"]
        );
        assert_eq!(
            b.push_args("k8s.io", "nginx:latest"),
            vec!["--namespace", "k8s.io", "push", "nginx:latest"]
        );
        assert_eq!(
            b.delete_args("k8s.io", "abc123"),
            vec!["--namespace", "k8s.io", "rmi", "abc123"]
        );
        assert_eq!(
            b.list_args("k8s.io"),
            vec!["--namespace", "k8s.io", "images", "--format", "{{json .}}"]
        );
    }

    #[tokio::test]
    async fn legacy_cleanup_targets_kim_namespace() {
        let cluster = MockCluster::new();
        cluster.insert(ResourceKind::Service, LEGACY_BUILDER_NAMESPACE, "builder");
        cluster.insert(ResourceKind::Service, LEGACY_BUILDER_NAMESPACE, "registry");
        cluster.insert(ResourceKind::DaemonSet, LEGACY_BUILDER_NAMESPACE, "builder");
        cluster.fail_delete("registry");

        let report = NerdctlBackend.remove_legacy_builder(&cluster).await;

        assert!(!cluster.contains(ResourceKind::Service, LEGACY_BUILDER_NAMESPACE, "builder"));
        assert!(!cluster.contains(ResourceKind::DaemonSet, LEGACY_BUILDER_NAMESPACE, "builder"));
        assert_eq!(report.failed, vec!["service kube-image/registry"]);
    }
}
