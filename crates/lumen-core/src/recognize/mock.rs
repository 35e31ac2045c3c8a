use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;

use super::{Recognition, RecognizeError, Recognizer};

type Handler = Arc<dyn Fn(&Bytes) -> Result<Recognition, RecognizeError> + Send + Sync>;

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    unhealthy: AtomicBool,
}

/// Decrements the in-flight counter even if the call is cancelled or panics.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic recognizer for tests and engine-less runs.
///
/// By default every image is "recognized" as `"<n> bytes"` with confidence
/// `1.0`. Clones share call counters.
#[derive(Clone)]
pub struct MockRecognizer {
    text: Option<String>,
    confidence: f32,
    delay: Option<Duration>,
    handler: Option<Handler>,
    counters: Arc<Counters>,
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self {
            text: None,
            confidence: 1.0,
            delay: None,
            handler: None,
            counters: Arc::default(),
        }
    }
}

impl fmt::Debug for MockRecognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRecognizer")
            .field("text", &self.text)
            .field("confidence", &self.confidence)
            .field("delay", &self.delay)
            .field("handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `text` for every image.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sleeps for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Computes each result with `handler`, which may also fail or panic.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Bytes) -> Result<Recognition, RecognizeError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Makes [`Recognizer::health_check`] fail or succeed.
    pub fn set_healthy(&self, healthy: bool) {
        self.counters.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Total number of calls started.
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Calls currently running.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls ever observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, image: Bytes) -> Result<Recognition, RecognizeError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .peak_in_flight
            .fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.counters.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.handler {
            Some(handler) => handler(&image),
            None => {
                let text = self
                    .text
                    .clone()
                    .unwrap_or_else(|| format!("{} bytes", image.len()));
                Ok(Recognition::new(text, self.confidence))
            }
        }
    }

    async fn health_check(&self) -> Result<(), RecognizeError> {
        if self.counters.unhealthy.load(Ordering::SeqCst) {
            return Err(RecognizeError::service_unavailable().with_message("mock marked unhealthy"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_reports_payload_size() {
        let mock = MockRecognizer::new();
        let recognition = mock.recognize(Bytes::from_static(b"12345")).await.unwrap();
        assert_eq!(recognition.text, "5 bytes");
        assert_eq!(recognition.confidence, 1.0);
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.in_flight(), 0);
    }

    #[tokio::test]
    async fn handler_overrides_text() {
        let mock = MockRecognizer::new()
            .with_text("ignored")
            .with_handler(|_| Err(RecognizeError::external_error().with_message("boom")));
        let err = mock.recognize(Bytes::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "external_error: boom");
    }

    #[tokio::test]
    async fn health_can_be_toggled() {
        let mock = MockRecognizer::new();
        assert!(mock.health_check().await.is_ok());
        mock.clone().set_healthy(false);
        assert!(mock.health_check().await.is_err());
    }
}
