mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_COMMAND_FAILED, EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "deskimg",
    version,
    about = "Build, pull, push, scan and watch container images in a local cluster"
)]
struct Cli {
    /// Image namespace (overrides the config file).
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Path to a JSON config file (default: ~/.config/deskimg/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List images in the current namespace.
    Images,
    /// Build an image from a local context directory.
    Build {
        /// Build context directory.
        #[arg(default_value = ".")]
        context: PathBuf,
        /// Dockerfile, relative to the context.
        #[arg(short, long, default_value = "Dockerfile")]
        file: PathBuf,
        /// Name and tag for the result, e.g. "app:1.0".
        #[arg(short, long)]
        tag: String,
    },
    /// Pull an image from a registry.
    Pull {
        /// Image reference.
        reference: String,
    },
    /// Push an image to its registry.
    Push {
        /// Image reference.
        reference: String,
    },
    /// Remove one or more images.
    Rmi {
        /// Image IDs or references.
        #[arg(required = true)]
        images: Vec<String>,
    },
    /// Scan an image for known vulnerabilities with trivy.
    Scan {
        /// Image reference.
        reference: String,
    },
    /// List image namespaces.
    Namespaces,
    /// Stream image list changes as JSON lines until interrupted.
    Watch {
        /// Also poll the image list every N seconds.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Remove the builder resources deployed by older releases.
    #[cfg(feature = "kube")]
    CleanupLegacy {
        /// Kubeconfig context of the local cluster.
        #[arg(long, default_value = "rancher-desktop")]
        context: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DESKIMG_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("command failed:") {
                EXIT_COMMAND_FAILED
            } else if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<u8, String> {
    if let Commands::Completions { shell } = cli.command {
        return commands::completions::run::<Cli>(shell);
    }

    let mut config = commands::load_config(cli.config.as_deref(), cli.namespace.as_deref())?;
    if let Commands::Watch {
        interval: Some(secs),
    } = cli.command
    {
        config.refresh_interval_secs = Some(secs);
    }
    let processor = commands::make_processor(&config);
    let json = cli.json;

    match cli.command {
        Commands::Images => commands::images::run(&processor, json).await,
        Commands::Build { context, file, tag } => {
            commands::build::run(&processor, &context, &file, &tag, json).await
        }
        Commands::Pull { reference } => commands::pull::run(&processor, &reference, json).await,
        Commands::Push { reference } => commands::push::run(&processor, &reference, json).await,
        Commands::Rmi { images } => commands::rmi::run(&processor, &images, json).await,
        Commands::Scan { reference } => commands::scan::run(&processor, &reference, json).await,
        Commands::Namespaces => commands::namespaces::run(&processor, json).await,
        Commands::Watch { .. } => commands::watch::run(&processor).await,
        #[cfg(feature = "kube")]
        Commands::CleanupLegacy { context } => {
            commands::cleanup::run(&processor, &context, json).await
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    }
}
