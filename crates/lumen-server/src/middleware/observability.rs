//! Observability middleware: request IDs and HTTP tracing spans.

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::TRACING_TARGET_HTTP;

/// Header carrying the per-request correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extension trait for `axum::`[`Router`] to apply observability middleware.
pub trait RouterObservabilityExt<S> {
    /// Layers request ID generation, HTTP tracing and request ID propagation.
    ///
    /// Incoming `x-request-id` headers are kept; otherwise a UUID is
    /// generated. The ID is recorded on the request span and echoed back in
    /// the response.
    fn with_observability(self) -> Self;
}

impl<S> RouterObservabilityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_observability(self) -> Self {
        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

        // The last layer wraps all others, so the ID is set before tracing.
        self.layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }
}

fn make_request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    tracing::info_span!(
        target: TRACING_TARGET_HTTP,
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use axum_test::TestServer;

    use super::*;

    fn server() -> anyhow::Result<TestServer> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_observability();
        Ok(TestServer::new(app)?)
    }

    #[tokio::test]
    async fn generates_request_id() -> anyhow::Result<()> {
        let response = server()?.get("/").await;
        response.assert_status_ok();

        let id = response.headers().get(REQUEST_ID_HEADER);
        assert!(id.is_some_and(|id| !id.is_empty()));
        Ok(())
    }

    #[tokio::test]
    async fn propagates_incoming_request_id() -> anyhow::Result<()> {
        let response = server()?
            .get("/")
            .add_header(REQUEST_ID_HEADER, "batch-42")
            .await;

        let id = response.headers().get(REQUEST_ID_HEADER);
        assert_eq!(id.and_then(|id| id.to_str().ok()), Some("batch-42"));
        Ok(())
    }
}
