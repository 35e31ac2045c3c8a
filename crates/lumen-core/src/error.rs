//! Batch-fatal error types.
//!
//! Only conditions that abort the whole request live here. Per-item problems
//! (validation rejections, recognition failures) are values carried through
//! the report, never errors.

use strum::{AsRefStr, IntoStaticStr};

use crate::archive::ArchiveError;

/// Result type alias for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of a batch-fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// The request itself is unacceptable (missing input, size or count limits).
    Intake,
    /// The archive was accepted but could not be unpacked safely.
    Extraction,
    /// The service failed independently of the request contents.
    Internal,
}

/// Errors that abort a batch before any recognition work begins.
#[derive(Debug, thiserror::Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Error {
    /// The request carried neither an archive nor any images.
    #[error("request contains neither an archive nor images")]
    NoInputProvided,

    /// The merged image count exceeds the per-request ceiling.
    #[error("request contains {count} images, the limit is {max}")]
    TooManyImages { count: usize, max: usize },

    /// Archive intake or extraction failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A blocking pipeline stage could not complete.
    #[error("pipeline stage failed: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Archive(err) => err.code(),
            other => other.into(),
        }
    }

    /// Returns whether the error stems from intake, extraction or the service.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoInputProvided | Self::TooManyImages { .. } => ErrorCategory::Intake,
            Self::Archive(err) => err.category(),
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::UnsafeReason;

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(Error::NoInputProvided.code(), "no_input_provided");
        assert_eq!(
            Error::TooManyImages { count: 3, max: 2 }.code(),
            "too_many_images"
        );
        assert_eq!(Error::Internal("boom".into()).code(), "internal");
    }

    #[test]
    fn archive_errors_keep_their_code_and_category() {
        let error = Error::from(ArchiveError::TooLarge { size: 10, max: 5 });
        assert_eq!(error.code(), "archive_too_large");
        assert_eq!(error.category(), ErrorCategory::Intake);

        let error = Error::from(ArchiveError::UnsafeContent(UnsafeReason::PathTraversal {
            name: "../x.png".into(),
        }));
        assert_eq!(error.code(), "unsafe_content");
        assert_eq!(error.category(), ErrorCategory::Extraction);
    }
}
