pub mod build;
#[cfg(feature = "kube")]
pub mod cleanup;
pub mod completions;
pub mod images;
pub mod namespaces;
pub mod pull;
pub mod push;
pub mod rmi;
pub mod scan;
pub mod watch;

use deskimg_engine::{
    EngineConfig, EventHub, ImageError, ImageProcessor, NerdctlBackend, TokioSpawner,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_COMMAND_FAILED: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Await `op` behind a spinner, unless output is JSON.
pub async fn with_spinner<T, F>(json: bool, msg: &str, ok: &str, fail: &str, op: F) -> Result<T, String>
where
    F: Future<Output = Result<T, ImageError>>,
{
    let pb = (!json).then(|| spinner(msg));
    match op.await {
        Ok(value) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, ok);
            }
            Ok(value)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, fail);
            }
            Err(describe(&e))
        }
    }
}

pub fn colorize_severity(severity: &str) -> String {
    use console::Style;
    match severity {
        "CRITICAL" => Style::new().red().bold().apply_to(severity).to_string(),
        "HIGH" => Style::new().red().apply_to(severity).to_string(),
        "MEDIUM" => Style::new().yellow().apply_to(severity).to_string(),
        "LOW" => Style::new().cyan().apply_to(severity).to_string(),
        "UNKNOWN" => Style::new().dim().apply_to(severity).to_string(),
        other => other.to_owned(),
    }
}

/// Render an engine error with the prefix `main` uses to pick the exit code.
pub fn describe(err: &ImageError) -> String {
    match err {
        ImageError::CommandFailed { .. } => format!("command failed: {err}"),
        ImageError::Config(_) => err.to_string(),
        other => other.to_string(),
    }
}

/// Load `path` when given, otherwise the default location, then apply a
/// `--namespace` override.
pub fn load_config(path: Option<&Path>, namespace: Option<&str>) -> Result<EngineConfig, String> {
    let loaded = match path {
        Some(p) => EngineConfig::load(p),
        None => EngineConfig::load_default(),
    };
    let mut config = loaded.map_err(|e| match e {
        ImageError::Config(_) => e.to_string(),
        other => format!("config error: {other}"),
    })?;
    if let Some(ns) = namespace {
        let ns = ns.trim();
        if ns.is_empty() {
            return Err("config error: --namespace must not be empty".to_owned());
        }
        ns.clone_into(&mut config.namespace);
    }
    Ok(config)
}

pub fn make_processor(config: &EngineConfig) -> ImageProcessor {
    ImageProcessor::from_config(
        Arc::new(NerdctlBackend::new()),
        Arc::new(TokioSpawner),
        EventHub::new(),
        config,
    )
}
