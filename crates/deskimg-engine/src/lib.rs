//! Image lifecycle engine for deskimg.
//!
//! This crate implements the image processing layer: a pluggable `ImageBackend`
//! trait with a nerdctl implementation, the `ImageProcessor` that owns namespace
//! and readiness state and runs the watch loop, a command runner that classifies
//! subprocess outcomes, a tolerant parser for line-delimited `images` output,
//! trivy report summaries, and best-effort cleanup of legacy builder resources.

pub mod backend;
pub mod cluster;
pub mod config;
pub mod events;
pub mod mock;
pub mod nerdctl;
pub mod parse;
pub mod processor;
pub mod resources;
pub mod runner;
pub mod scan;

pub use backend::{select_backend, ImageBackend};
pub use cluster::{CleanupReport, ClusterClient, ResourceKind};
pub use config::EngineConfig;
pub use events::{CommandOutcome, EventHub, ImageEvent};
pub use nerdctl::NerdctlBackend;
pub use parse::{parse_images, ImageRecord};
pub use processor::{ImageProcessor, ProcessorState};
pub use resources::{Resources, Tool};
pub use runner::{CommandResult, CommandRunner, Spawner, TokioSpawner};
pub use scan::ScanReport;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{subcommand} failed ({}): {}", .result.describe_exit(), .result.stderr.trim())]
    CommandFailed {
        subcommand: String,
        result: CommandResult,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("backend '{0}' is not available")]
    BackendUnavailable(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cluster API error: {0}")]
    Cluster(String),
}
