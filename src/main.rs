//! Notebook server (v1)
//!
//! Boots the notebook server: resolves which implementation backs each
//! pluggable subsystem, binds a plaintext or TLS listener, initializes
//! notebook storage and recovery, and runs until a signal or an explicit
//! shutdown request.
//!
//! # Architecture Overview
//!
//! ```text
//!   config (TOML) ──▶ registry ──▶ tls ──▶ listener (bound, idle)
//!                        │
//!                        ▼
//!          notebook repo init ──▶ cluster wiring ──▶ management routes
//!                        │
//!                        ▼
//!          notebook recovery ──▶ run-on-start ──▶ listener accepting
//!                        │
//!                        ▼
//!          construction error window ──▶ RUNNING ──▶ shutdown (once)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use notebook_server::config::{load_config, ServerConfig};
use notebook_server::lifecycle::Orchestrator;
use notebook_server::observability::logging;

#[derive(Parser)]
#[command(name = "notebook-server")]
#[command(about = "Multi-tenant notebook server", long_about = None)]
struct Args {
    /// Configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive, overriding the configuration.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => load_config(path),
        None => Ok(ServerConfig::default()),
    };
    let level = args
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.observability.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    logging::init(&level);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(
        address = %config.server.address,
        port = config.server.effective_port(config.tls.enabled),
        tls = config.tls.enabled,
        cluster = config.cluster.enabled,
        "Configuration loaded"
    );

    let orchestrator = Orchestrator::builder(config).build();
    match orchestrator.start().await {
        Ok(code) => {
            info!(exit_code = code, "Shutdown complete");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        Err(e) => {
            error!(error = %e, "Notebook server failed to start");
            ExitCode::FAILURE
        }
    }
}
