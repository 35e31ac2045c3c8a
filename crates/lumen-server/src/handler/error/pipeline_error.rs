//! Conversion of batch-fatal pipeline errors into HTTP errors.

use lumen_core::archive::{ArchiveError, UnsafeReason};

use super::http_error::{Error, ErrorKind};
use crate::TRACING_TARGET_HANDLER;

impl From<lumen_core::Error> for Error<'static> {
    fn from(error: lumen_core::Error) -> Self {
        let kind = match &error {
            lumen_core::Error::NoInputProvided => ErrorKind::NoInputProvided,
            lumen_core::Error::TooManyImages { .. } => ErrorKind::TooManyImages,
            lumen_core::Error::Archive(archive) => archive_kind(archive),
            lumen_core::Error::Internal(_) => ErrorKind::InternalServerError,
        };

        if kind == ErrorKind::InternalServerError {
            tracing::error!(
                target: TRACING_TARGET_HANDLER,
                error = %error,
                code = error.code(),
                "batch failed on a service error"
            );
            return kind.with_context(error.to_string());
        }

        tracing::debug!(
            target: TRACING_TARGET_HANDLER,
            error = %error,
            code = error.code(),
            "batch rejected"
        );

        let http_error = kind.with_message(error.to_string());
        match offending_entry(&error) {
            Some(name) => http_error.with_resource(name),
            None => http_error,
        }
    }
}

fn archive_kind(error: &ArchiveError) -> ErrorKind {
    match error {
        ArchiveError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
        ArchiveError::TooLarge { .. } => ErrorKind::ArchiveTooLarge,
        ArchiveError::UnsafeContent(_) => ErrorKind::UnsafeContent,
        ArchiveError::NoImagesFound => ErrorKind::NoImagesFound,
        ArchiveError::Decode(_) => ErrorKind::ArchiveDecodeFailed,
        ArchiveError::DecoderUnavailable { .. } | ArchiveError::Io(_) => {
            ErrorKind::InternalServerError
        }
    }
}

/// Returns the archive entry or upload a rejection points at, if any.
fn offending_entry(error: &lumen_core::Error) -> Option<String> {
    match error {
        lumen_core::Error::Archive(ArchiveError::UnsupportedFormat { filename }) => {
            Some(filename.clone())
        }
        lumen_core::Error::Archive(ArchiveError::UnsafeContent(
            UnsafeReason::PathTraversal { name } | UnsafeReason::EntryTooLarge { name, .. },
        )) => Some(name.clone()),
        _ => None,
    }
}
