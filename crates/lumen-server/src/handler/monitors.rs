//! Health and service information handlers.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use lumen_core::Pipeline;

use crate::TRACING_TARGET_HANDLER;
use crate::handler::response::{HealthStatus, ServiceInfo};
use crate::service::ServiceState;

/// Upper bound on how long a health check waits for the engine.
const ENGINE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports service health, probing the recognition engine.
///
/// Answers `503` with a `degraded` body when the engine is unreachable.
#[tracing::instrument(target = TRACING_TARGET_HANDLER, skip_all)]
async fn health_status(State(pipeline): State<Pipeline>) -> (StatusCode, Json<HealthStatus>) {
    let probe = pipeline.recognizer().health_check();
    let engine = match tokio::time::timeout(ENGINE_PROBE_TIMEOUT, probe).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            tracing::warn!(
                target: TRACING_TARGET_HANDLER,
                error = %error,
                "recognition engine failed its health check"
            );
            false
        }
        Err(_) => {
            tracing::warn!(
                target: TRACING_TARGET_HANDLER,
                timeout = ?ENGINE_PROBE_TIMEOUT,
                "recognition engine health check timed out"
            );
            false
        }
    };

    let status_code = if engine {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(HealthStatus::new(engine)))
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Returns a [`Router`] with the health and info routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_status))
}
