use std::time::Duration;

use lumen_core::recognize::RecognizeError;

/// Result type for PaddleOCR client operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures talking to a PaddleOCR serving endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection, TLS or transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an error status or error code.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// The client configuration is unusable.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The service reported a gateway or request timeout.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The service asked for fewer requests.
    #[error("rate limit exceeded")]
    RateLimit { retry_after: Option<Duration> },

    /// The service is temporarily down.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl Error {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Whether a later attempt of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimit { .. } | Self::ServiceUnavailable { .. } => true,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Api { status, .. } => matches!(*status, 429 | 502 | 503),
            Self::InvalidResponse { .. } | Self::Config { .. } => false,
        }
    }

    /// Returns the HTTP status, when the failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns the delay the service asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<Error> for RecognizeError {
    fn from(err: Error) -> Self {
        let base = match &err {
            Error::Http(inner) if inner.is_timeout() => RecognizeError::timeout(),
            Error::Http(_) => RecognizeError::network_error(),
            Error::Api { status, .. } if (400..500).contains(status) => {
                RecognizeError::invalid_input()
            }
            Error::Api { .. } => RecognizeError::external_error(),
            Error::InvalidResponse { .. } => RecognizeError::serialization(),
            Error::Config { .. } => RecognizeError::configuration(),
            Error::Timeout { .. } => RecognizeError::timeout(),
            Error::RateLimit { .. } => RecognizeError::rate_limited(),
            Error::ServiceUnavailable { .. } => RecognizeError::service_unavailable(),
        };

        base.with_message(err.to_string()).with_source(err)
    }
}
