//! Monitor response types.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// The server and the recognition engine are both reachable.
    Healthy,
    /// The server is up but the recognition engine did not answer.
    Degraded,
}

/// Body of `GET /health`.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    /// Whether the recognition engine passed its health check.
    pub engine: bool,
    pub version: String,
    pub checked_at: Timestamp,
}

impl HealthStatus {
    pub fn new(engine: bool) -> Self {
        Self {
            status: if engine {
                HealthState::Healthy
            } else {
                HealthState::Degraded
            },
            engine,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            checked_at: Timestamp::now(),
        }
    }
}

/// Body of `GET /`.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub status: String,
    pub endpoints: EndpointIndex,
}

/// Paths of the public endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointIndex {
    pub extract: String,
    pub health: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: "Lumen OCR API".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            status: "running".to_owned(),
            endpoints: EndpointIndex {
                extract: "/api/v1/ocr/extract".to_owned(),
                health: "/health".to_owned(),
            },
        }
    }
}
