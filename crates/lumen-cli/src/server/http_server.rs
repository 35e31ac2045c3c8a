//! HTTP server startup and lifecycle management.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::server::{Result, ServerError, shutdown_signal};
use crate::{TRACING_TARGET_SERVER_SHUTDOWN, TRACING_TARGET_SERVER_STARTUP};

/// Binds the configured address and serves `app` with graceful shutdown.
///
/// Once a shutdown signal arrives, running requests get
/// [`ServerConfig::shutdown_timeout`] to finish before the server stops
/// waiting for them.
pub async fn serve_http(app: Router, config: &ServerConfig) -> Result<()> {
    let server_addr = config.server_addr();

    let listener = TcpListener::bind(server_addr).await.map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_SERVER_STARTUP,
            addr = %server_addr,
            error = %err,
            "failed to bind to address"
        );
        ServerError::bind_error(&server_addr.to_string(), err)
    })?;

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        addr = %server_addr,
        "server is ready and listening for connections"
    );

    if config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_STARTUP,
            "server is bound to all interfaces, ensure firewall rules are configured"
        );
    }

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    let graceful = token.clone();
    let server = async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await
    };

    let result = tokio::select! {
        result = server => result.map_err(ServerError::Runtime),
        () = drain_deadline(&token, config.shutdown_timeout()) => {
            tracing::warn!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                timeout_secs = config.shutdown_timeout,
                "shutdown timeout elapsed, abandoning in-flight requests"
            );
            Ok(())
        }
    };

    // Stops the signal listener if the server exited on its own.
    token.cancel();

    match &result {
        Ok(()) => tracing::info!(target: TRACING_TARGET_SERVER_SHUTDOWN, "server shut down"),
        Err(err) => tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %err,
            context = ?err.context(),
            "server encountered an error"
        ),
    }

    result
}

/// Completes `timeout` after `token` is cancelled.
async fn drain_deadline(token: &CancellationToken, timeout: Duration) {
    token.cancelled().await;
    tokio::time::sleep(timeout).await;
}
