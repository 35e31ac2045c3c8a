//! All `axum::`[`Router`]s with related `axum::`[`Handler`]s.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lumen_core::PipelineConfig;
//! use lumen_core::recognize::MockRecognizer;
//! use lumen_server::handler::routes;
//! use lumen_server::service::ServiceState;
//!
//! let state = ServiceState::from_config(
//!     PipelineConfig::default(),
//!     Arc::new(MockRecognizer::new()),
//! );
//! let app: axum::Router = routes(&state).with_state(state);
//! ```
//!
//! [`Router`]: axum::routing::Router
//! [`Handler`]: axum::handler::Handler

mod error;
mod extract;
mod monitors;
mod response;

use axum::Router;
use axum::response::{IntoResponse, Response};

pub use crate::handler::error::{Error, ErrorKind, Result};
pub use crate::handler::response::{
    EndpointIndex, ErrorResponse, HealthState, HealthStatus, ServiceInfo,
};
use crate::service::ServiceState;

#[inline]
async fn fallback() -> Response {
    ErrorKind::NotFound.into_response()
}

/// Returns a [`Router`] with all routes.
///
/// The extraction route's body limit is derived from the pipeline limits in
/// `state`.
pub fn routes(state: &ServiceState) -> Router<ServiceState> {
    Router::new()
        .merge(extract::routes(state.pipeline().config()))
        .merge(monitors::routes())
        .fallback(fallback)
}
