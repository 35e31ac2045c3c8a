use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use lumen_core::recognize::{Recognition, RecognizeError, Recognizer, TextLine, assemble};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use url::Url;

use super::response::{OcrRequest, OcrResponse};
use crate::{Error, PdConfig, Result, TRACING_TARGET_CLIENT, TRACING_TARGET_HTTP};

/// Image payloads are always sent as `fileType = 1`.
const FILE_TYPE_IMAGE: u8 = 1;

/// HTTP client for a PaddleOCR serving endpoint.
#[derive(Debug, Clone)]
pub struct PdClient {
    http_client: Client,
    config: PdConfig,
    ocr_url: Url,
    health_url: Url,
}

impl PdClient {
    /// Creates a client; fails only if the HTTP client cannot be built.
    pub fn new(config: PdConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        let ocr_url = config.endpoint("ocr")?;
        let health_url = config.endpoint("health")?;

        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            base_url = %config.base_url(),
            timeout = ?config.timeout(),
            languages = ?config.languages(),
            "paddle client initialized"
        );

        Ok(Self {
            http_client,
            config,
            ocr_url,
            health_url,
        })
    }

    pub fn config(&self) -> &PdConfig {
        &self.config
    }

    /// Sends one image and returns the raw recognized lines.
    pub async fn recognize_lines(&self, image: &[u8]) -> Result<Vec<TextLine>> {
        let request = OcrRequest {
            file: STANDARD.encode(image),
            file_type: FILE_TYPE_IMAGE,
            lang: self.config.primary_language(),
            use_gpu: self.config.use_gpu(),
        };

        tracing::debug!(
            target: TRACING_TARGET_HTTP,
            url = %self.ocr_url,
            size = image.len(),
            "sending image to paddle"
        );

        self.execute_with_retry(&request).await
    }

    async fn execute_with_retry(&self, request: &OcrRequest<'_>) -> Result<Vec<TextLine>> {
        let max_retries = self.config.max_retries();
        let mut attempt = 0;

        loop {
            let result = async {
                let response = self
                    .http_client
                    .post(self.ocr_url.clone())
                    .json(request)
                    .send()
                    .await?;
                self.handle_response(response).await
            }
            .await;

            match result {
                Ok(lines) => {
                    if attempt > 0 {
                        tracing::info!(
                            target: TRACING_TARGET_CLIENT,
                            attempt = attempt + 1,
                            "paddle request succeeded after retry"
                        );
                    }
                    return Ok(lines);
                }
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.config.retry_backoff() * attempt);

                    tracing::warn!(
                        target: TRACING_TARGET_CLIENT,
                        attempt,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "paddle request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(
                        target: TRACING_TARGET_CLIENT,
                        attempt = attempt + 1,
                        error = %err,
                        "paddle request failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Vec<TextLine>> {
        let status = response.status();
        tracing::debug!(
            target: TRACING_TARGET_HTTP,
            status = status.as_u16(),
            "paddle responded"
        );

        if status.is_success() {
            let body: OcrResponse = response
                .json()
                .await
                .map_err(|e| Error::invalid_response(format!("failed to parse body: {e}")))?;
            return body.into_lines(status.as_u16());
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimit { retry_after },
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                Error::service_unavailable(format!("paddle answered {status}"))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Error::Timeout {
                timeout: self.config.timeout(),
            },
            _ => {
                let message = serde_json::from_str::<OcrResponse>(&body)
                    .ok()
                    .and_then(|parsed| parsed.error_msg)
                    .unwrap_or(body);
                Error::api(status.as_u16(), message)
            }
        })
    }

    /// Probes `GET {base}/health`.
    pub async fn check_health(&self) -> Result<()> {
        let response = self.http_client.get(self.health_url.clone()).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            Err(Error::service_unavailable(format!(
                "health check answered {status}"
            )))
        }
    }
}

#[async_trait::async_trait]
impl Recognizer for PdClient {
    async fn recognize(&self, image: Bytes) -> std::result::Result<Recognition, RecognizeError> {
        let lines = self.recognize_lines(&image).await?;
        Ok(assemble(lines, self.config.cleanup()))
    }

    async fn health_check(&self) -> std::result::Result<(), RecognizeError> {
        Ok(self.check_health().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use lumen_core::recognize::{RecognizeErrorKind, TextCleanup};
    use serde_json::{Value, json};

    use super::*;

    #[derive(Clone, Default)]
    struct Fake {
        attempts: Arc<AtomicUsize>,
        fail_first: usize,
    }

    async fn ocr(State(fake): State<Fake>, Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        let attempt = fake.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < fake.fail_first {
            return (AxumStatus::SERVICE_UNAVAILABLE, Json(json!({})));
        }
        if body["file"].as_str().is_none_or(str::is_empty) || body["fileType"] != 1 {
            return (
                AxumStatus::BAD_REQUEST,
                Json(json!({"errorCode": 400, "errorMsg": "missing file"})),
            );
        }

        let body = json!({
            "errorCode": 0,
            "errorMsg": "Success",
            "result": {"ocrResults": [{"prunedResult": {
                "rec_texts": [" Total ", "42"],
                "rec_scores": [0.9, 0.7]
            }}]}
        });
        (AxumStatus::OK, Json(body))
    }

    async fn spawn(fake: Fake) -> SocketAddr {
        let app = Router::new()
            .route("/ocr", post(ocr))
            .route("/health", get(|| async { "ok" }))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        addr
    }

    fn client(addr: SocketAddr) -> PdClient {
        let config = PdConfig::new(format!("http://{addr}"))
            .unwrap()
            .with_retry_backoff(Duration::from_millis(5))
            .with_cleanup(TextCleanup {
                paragraph_mode: true,
                ..TextCleanup::default()
            });
        PdClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn recognizes_and_assembles_lines() {
        let addr = spawn(Fake::default()).await;
        let recognition = client(addr)
            .recognize(Bytes::from_static(b"\x89PNG"))
            .await
            .unwrap();

        assert_eq!(recognition.text, "Total 42");
        assert!((recognition.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn retries_unavailable_service() {
        let fake = Fake {
            fail_first: 2,
            ..Fake::default()
        };
        let attempts = Arc::clone(&fake.attempts);
        let addr = spawn(fake).await;

        let lines = client(addr).recognize_lines(b"img").await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let fake = Fake {
            fail_first: usize::MAX,
            ..Fake::default()
        };
        let attempts = Arc::clone(&fake.attempts);
        let addr = spawn(fake).await;

        let err = client(addr)
            .recognize(Bytes::from_static(b"img"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RecognizeErrorKind::ServiceUnavailable);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let fake = Fake::default();
        let attempts = Arc::clone(&fake.attempts);
        let addr = spawn(fake).await;

        let err = client(addr).recognize_lines(b"").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 400, ref message } if message == "missing file"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn health_check_hits_health_endpoint() {
        let addr = spawn(Fake::default()).await;
        assert!(client(addr).health_check().await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_engine_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PdClient::new(
            PdConfig::new(format!("http://{addr}"))
                .unwrap()
                .with_max_retries(0),
        )
        .unwrap();
        let err = client.health_check().await.unwrap_err();
        assert_eq!(err.kind(), RecognizeErrorKind::NetworkError);
    }
}
