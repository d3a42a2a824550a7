use crate::cluster::{CleanupReport, ClusterClient};
use crate::resources::Tool;
use crate::ImageError;
use async_trait::async_trait;
use std::path::Path;

/// Backend-specific argument grammar for each image operation.
///
/// Implementations only construct arguments; execution, event publication
/// and state live in [`crate::ImageProcessor`]. Every builder receives the
/// processor's current namespace.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// The executable that understands the arguments built below.
    fn tool(&self) -> Tool {
        Tool::Nerdctl
    }

    fn build_args(
        &self,
        namespace: &str,
        context_dir: &Path,
        file: &Path,
        tagged_name: &str,
    ) -> Vec<String>;

    fn pull_args(&self, namespace: &str, tagged_name: &str) -> Vec<String>;

    fn push_args(&self, namespace: &str, tagged_name: &str) -> Vec<String>;

    fn delete_args(&self, namespace: &str, image_id: &str) -> Vec<String>;

    /// Arguments that print one JSON object per image per line.
    fn list_args(&self, namespace: &str) -> Vec<String>;

    fn namespaces_args(&self, namespace: &str) -> Vec<String>;

    /// Arguments for the vulnerability scanner ([`Tool::Trivy`]).
    fn scan_args(&self, tagged_name: &str) -> Vec<String> {
        ["--quiet", "image", "--format", "json", tagged_name]
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
    }

    /// Remove cluster resources left behind by earlier releases.
    /// Best effort; problems end up in the report, never as an error.
    async fn remove_legacy_builder(&self, _cluster: &dyn ClusterClient) -> CleanupReport {
        CleanupReport::default()
    }
}

pub fn select_backend(name: &str) -> Result<Box<dyn ImageBackend>, ImageError> {
    match name {
        "nerdctl" => Ok(Box::new(crate::nerdctl::NerdctlBackend::new())),
        other => Err(ImageError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_backend() {
        let backend = select_backend("nerdctl").unwrap();
        assert_eq!(backend.name(), "nerdctl");
        assert_eq!(backend.tool(), Tool::Nerdctl);
    }

    #[test]
    fn select_invalid_backend_fails() {
        assert!(matches!(
            select_backend("kim"),
            Err(ImageError::BackendUnavailable(name)) if name == "kim"
        ));
    }

    #[test]
    fn default_scan_args() {
        let backend = select_backend("nerdctl").unwrap();
        assert_eq!(
            backend.scan_args("rancher/k3d:v1"),
            vec!["--quiet", "image", "--format", "json", "rancher/k3d:v1"]
        );
    }
}
