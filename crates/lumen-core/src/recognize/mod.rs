//! Text recognition capability.
//!
//! The pipeline only sees the [`Recognizer`] trait. Engine clients live in
//! their own crates; [`MockRecognizer`] stands in when no engine is wired.

mod mock;
mod text;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

pub use self::mock::MockRecognizer;
pub use self::text::{TextCleanup, TextLine, assemble};

/// Type alias for boxed errors carried as a [`RecognizeError`] source.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Recognized text for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Mean line confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Categories of recognition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RecognizeErrorKind {
    /// The image was refused by the engine.
    InvalidInput,
    /// The engine could not be reached.
    NetworkError,
    /// The engine asked the caller to slow down.
    RateLimited,
    /// The engine is temporarily unavailable.
    ServiceUnavailable,
    /// The engine reported an error.
    ExternalError,
    /// The engine did not answer in time.
    Timeout,
    /// The engine answered with an unexpected payload.
    Serialization,
    /// The client is misconfigured.
    Configuration,
    /// Anything else.
    InternalError,
}

impl RecognizeErrorKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// A recognition failure for one image.
#[derive(Debug, thiserror::Error)]
#[error("{}{}", kind.as_str(), message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct RecognizeError {
    pub kind: RecognizeErrorKind,
    pub message: Option<String>,
    #[source]
    pub source: Option<BoxedError>,
}

impl RecognizeError {
    pub fn new(kind: RecognizeErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_input() -> Self {
        Self::new(RecognizeErrorKind::InvalidInput)
    }

    pub fn network_error() -> Self {
        Self::new(RecognizeErrorKind::NetworkError)
    }

    pub fn rate_limited() -> Self {
        Self::new(RecognizeErrorKind::RateLimited)
    }

    pub fn service_unavailable() -> Self {
        Self::new(RecognizeErrorKind::ServiceUnavailable)
    }

    pub fn external_error() -> Self {
        Self::new(RecognizeErrorKind::ExternalError)
    }

    pub fn timeout() -> Self {
        Self::new(RecognizeErrorKind::Timeout)
    }

    pub fn serialization() -> Self {
        Self::new(RecognizeErrorKind::Serialization)
    }

    pub fn configuration() -> Self {
        Self::new(RecognizeErrorKind::Configuration)
    }

    pub fn internal_error() -> Self {
        Self::new(RecognizeErrorKind::InternalError)
    }

    #[inline]
    pub fn kind(&self) -> RecognizeErrorKind {
        self.kind
    }
}

/// An OCR engine.
///
/// Implementations must be safe to call concurrently; the batch executor
/// bounds how many calls are in flight.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognizes the text in one validated PNG or JPEG payload.
    async fn recognize(&self, image: Bytes) -> Result<Recognition, RecognizeError>;

    /// Probes whether the engine is reachable and ready.
    async fn health_check(&self) -> Result<(), RecognizeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_kind_and_message() {
        let err = RecognizeError::service_unavailable().with_message("engine restarting");
        assert_eq!(err.to_string(), "service_unavailable: engine restarting");
        assert_eq!(RecognizeError::timeout().to_string(), "timeout");
    }
}
