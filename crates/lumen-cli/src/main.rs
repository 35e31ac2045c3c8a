#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;

use std::path::Path;
use std::process;

use anyhow::Context;
use axum::Router;
use lumen_server::handler::routes;
use lumen_server::middleware::{RouterObservabilityExt, RouterRecoveryExt, RouterSecurityExt};
use lumen_server::service::ServiceState;

use crate::config::{Cli, MiddlewareConfig};
use crate::server::ServerError;

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "lumen_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "lumen_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "lumen_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = format!("{error:#}"),
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    Cli::init_tracing();
    cli.validate()?;
    cli.log();

    let pipeline_config = cli
        .pipeline
        .to_pipeline_config()
        .context("invalid pipeline configuration")?;
    prepare_scratch(&pipeline_config.temp_dir)?;

    let recognizer = cli
        .engine
        .create_recognizer()
        .context("failed to create OCR engine")?;

    let temp_root = pipeline_config.temp_dir.clone();
    let state = ServiceState::from_config(pipeline_config, recognizer);
    let router = create_router(state, &cli.middleware);

    server::serve(router, &cli.server).await?;

    sweep_scratch(&temp_root);
    Ok(())
}

/// Creates the router with all middleware layers applied.
///
/// Middleware is applied in reverse order (last added = outermost):
/// 1. Recovery (outermost) - catches panics and enforces timeouts
/// 2. Observability - request IDs and tracing spans
/// 3. Security - CORS, nosniff, compression
/// 4. Routes (innermost) - actual request handlers
fn create_router(state: ServiceState, middleware: &MiddlewareConfig) -> Router {
    let api_routes: Router = routes(&state).with_state(state);

    api_routes
        .with_security(&middleware.cors)
        .with_observability()
        .with_recovery(&middleware.recovery)
}

/// Creates the temp root and removes scratch directories left by a previous run.
fn prepare_scratch(temp_root: &Path) -> Result<(), ServerError> {
    let removed = lumen_core::prepare_temp_root(temp_root)
        .map_err(|source| ServerError::temp_root(temp_root, source))?;

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        temp_root = %temp_root.display(),
        stale_removed = removed,
        "scratch root prepared"
    );
    Ok(())
}

/// Removes scratch directories that outlived their requests.
fn sweep_scratch(temp_root: &Path) {
    match lumen_core::sweep_temp_root(temp_root) {
        Ok(removed) => tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            temp_root = %temp_root.display(),
            removed,
            "scratch root swept"
        ),
        Err(err) => tracing::warn!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            temp_root = %temp_root.display(),
            error = %err,
            "failed to sweep scratch root"
        ),
    }
}
