use std::fmt;
use std::path::PathBuf;

/// External executables the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Nerdctl,
    Trivy,
}

impl Tool {
    pub fn binary_name(self) -> &'static str {
        match self {
            Tool::Nerdctl => "nerdctl",
            Tool::Trivy => "trivy",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Locates the executables for each [`Tool`].
///
/// Lookup order: an explicit per-tool override, then `<resources_dir>/bin/<name>`
/// when that file exists, then the bare binary name (resolved through `PATH`
/// at spawn time).
#[derive(Debug, Clone, Default)]
pub struct Resources {
    resources_dir: Option<PathBuf>,
    nerdctl: Option<PathBuf>,
    trivy: Option<PathBuf>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resources_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resources_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_override(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        let path = Some(path.into());
        match tool {
            Tool::Nerdctl => self.nerdctl = path,
            Tool::Trivy => self.trivy = path,
        }
        self
    }

    pub fn executable(&self, tool: Tool) -> PathBuf {
        let explicit = match tool {
            Tool::Nerdctl => self.nerdctl.as_ref(),
            Tool::Trivy => self.trivy.as_ref(),
        };
        if let Some(path) = explicit {
            return path.clone();
        }
        if let Some(dir) = &self.resources_dir {
            let bundled = dir.join("bin").join(tool.binary_name());
            if bundled.is_file() {
                return bundled;
            }
        }
        PathBuf::from(tool.binary_name())
    }
}
