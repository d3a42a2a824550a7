use crate::resources::{Resources, Tool};
use crate::ImageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "k8s.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub namespace: String,
    /// Directory holding bundled tools under `bin/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nerdctl: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trivy: Option<PathBuf>,
    /// Poll the image list this often while active and ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            resources_dir: None,
            nerdctl: None,
            trivy: None,
            refresh_interval_secs: None,
        }
    }
}

impl EngineConfig {
    /// Load `$DESKIMG_CONFIG`, or `~/.config/deskimg/config.json`. A missing
    /// default file yields the defaults; `DESKIMG_NAMESPACE` overrides the
    /// namespace either way.
    pub fn load_default() -> Result<Self, ImageError> {
        let mut config = if let Ok(path) = std::env::var("DESKIMG_CONFIG") {
            Self::load(Path::new(&path))?
        } else {
            let path = default_config_path()?;
            if path.exists() {
                Self::load(&path)?
            } else {
                Self::default()
            }
        };
        if let Ok(ns) = std::env::var("DESKIMG_NAMESPACE") {
            if !ns.trim().is_empty() {
                config.namespace = ns.trim().to_owned();
            }
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ImageError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ImageError::Config(format!("invalid config {}: {e}", path.display())))?;
        if config.namespace.trim().is_empty() {
            return Err(ImageError::Config(format!(
                "invalid config {}: namespace must not be empty",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ImageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn resources(&self) -> Resources {
        let mut resources = Resources::new();
        if let Some(dir) = &self.resources_dir {
            resources = resources.with_resources_dir(dir);
        }
        if let Some(path) = &self.nerdctl {
            resources = resources.with_override(Tool::Nerdctl, path);
        }
        if let Some(path) = &self.trivy {
            resources = resources.with_override(Tool::Trivy, path);
        }
        resources
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

pub fn default_config_path() -> Result<PathBuf, ImageError> {
    let home = std::env::var("HOME").map_err(|_| ImageError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/deskimg/config.json"))
}
