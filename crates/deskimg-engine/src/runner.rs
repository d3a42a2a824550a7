use crate::events::{CommandOutcome, EventHub, ImageEvent};
use crate::resources::{Resources, Tool};
use crate::ImageError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tracing::debug;

/// Captured outcome of one subprocess that was successfully launched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn describe_exit(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("killed by signal {signal}"),
            (None, None) => "unknown exit status".to_owned(),
        }
    }

    /// Turn a nonzero exit or signal termination into [`ImageError::CommandFailed`].
    pub fn into_checked(self, subcommand: &str) -> Result<Self, ImageError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ImageError::CommandFailed {
                subcommand: subcommand.to_owned(),
                result: self,
            })
        }
    }

    fn from_output(output: std::process::Output) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&output.status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            signal,
        }
    }
}

/// Launches a program and waits for it with fully captured output.
#[async_trait]
pub trait Spawner: Send + Sync {
    async fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<CommandResult>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

#[async_trait]
impl Spawner for TokioSpawner {
    async fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<CommandResult> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(CommandResult::from_output(output))
    }
}

/// Runs one tool invocation per call and reports user-visible results on the hub.
#[derive(Clone)]
pub struct CommandRunner {
    processor: String,
    spawner: Arc<dyn Spawner>,
    resources: Resources,
    hub: EventHub,
}

impl CommandRunner {
    pub fn new(
        processor: impl Into<String>,
        spawner: Arc<dyn Spawner>,
        resources: Resources,
        hub: EventHub,
    ) -> Self {
        Self {
            processor: processor.into(),
            spawner,
            resources,
            hub,
        }
    }

    /// Execute `tool` with `args` exactly once.
    ///
    /// Launch failures are errors. Nonzero exits come back as `Ok` with the exit
    /// code and stderr filled in; the caller decides how severe they are. With
    /// `notify` set, a `CommandEnded` event is published either way.
    pub async fn run(
        &self,
        tool: Tool,
        subcommand: &str,
        args: &[String],
        notify: bool,
    ) -> Result<CommandResult, ImageError> {
        let program = self.resources.executable(tool);
        debug!("{} {}", program.display(), args.join(" "));

        match self.spawner.spawn(&program, args).await {
            Ok(result) => {
                if !result.success() {
                    debug!(
                        "{tool} {subcommand}: {}: {}",
                        result.describe_exit(),
                        result.stderr.trim()
                    );
                }
                if notify {
                    self.notify(subcommand, &result);
                }
                Ok(result)
            }
            Err(source) => {
                if notify {
                    self.notify(
                        subcommand,
                        &CommandResult {
                            stderr: source.to_string(),
                            ..CommandResult::default()
                        },
                    );
                }
                Err(ImageError::Spawn {
                    program: program.display().to_string(),
                    source,
                })
            }
        }
    }

    fn notify(&self, subcommand: &str, result: &CommandResult) {
        let outcome = if result.success() {
            CommandOutcome::Success
        } else {
            CommandOutcome::Failure
        };
        self.hub.publish(ImageEvent::CommandEnded {
            processor: self.processor.clone(),
            subcommand: subcommand.to_owned(),
            outcome,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            exit_code: result.exit_code,
        });
    }
}
