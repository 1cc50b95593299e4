//! Ensemble - compose and dispatch capability pipelines
//!
//! Main entry point for the Ensemble CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{capabilities, config, dispatch, pipelines, run, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Ensemble - compose and dispatch capability pipelines
#[derive(Parser)]
#[command(name = "ensemble")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "ENSEMBLE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Project directory searched for ensemble.toml (default: current dir)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browse the pipeline catalog
    Pipelines(pipelines::PipelinesArgs),

    /// Run a catalog pipeline
    Run(run::RunArgs),

    /// Classify a request and run an ad hoc pipeline for it
    Dispatch(dispatch::DispatchArgs),

    /// List configured capabilities
    Capabilities(capabilities::CapabilitiesArgs),

    /// Show catalog status by category and pattern
    Status(status::StatusArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console logs go to stderr so --json output stays parseable.
    let filter = if cli.verbose {
        "ensemble=debug,ensemble_domain=debug,ensemble_pipeline=debug,ensemble_config=debug,info"
    } else {
        "ensemble=warn,ensemble_domain=warn,ensemble_pipeline=warn,ensemble_config=warn,error"
    };

    let log_dir = cli
        .config_dir
        .clone()
        .or_else(ensemble_config::xdg_config_dir)
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ensemble.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(concat!(
                    "ensemble=trace,ensemble_domain=trace,",
                    "ensemble_pipeline=trace,ensemble_config=trace,info",
                ))),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config_dir: cli.config_dir,
        project_dir: cli.project,
    };

    match cli.command {
        Commands::Pipelines(args) => pipelines::run(args, &ctx).await,
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Dispatch(args) => dispatch::run(args, &ctx).await,
        Commands::Capabilities(args) => capabilities::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
