use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// JSON body of every error answer.
///
/// `name` is the machine-readable reason code clients branch on. `message`
/// is safe to show to users; `resource` names the offending upload or
/// archive entry when there is one.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse<'a> {
    pub name: Cow<'a, str>,
    pub message: Cow<'a, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Cow<'a, str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Cow<'a, str>>,
    /// HTTP status code (not serialized in JSON)
    #[serde(skip, default = "internal_status")]
    pub status: StatusCode,
}

fn internal_status() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

impl<'a> ErrorResponse<'a> {
    // 400 Bad Request
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "The request could not be processed due to invalid data",
        StatusCode::BAD_REQUEST,
    );
    pub const NO_INPUT_PROVIDED: Self = Self::new(
        "no_input_provided",
        "Either an 'archive' or at least one file in 'images' must be provided",
        StatusCode::BAD_REQUEST,
    );
    pub const UNSUPPORTED_FORMAT: Self = Self::new(
        "unsupported_format",
        "Unsupported archive format. Supported: zip, tar, tar.gz, tar.bz2, rar",
        StatusCode::BAD_REQUEST,
    );
    pub const TOO_MANY_IMAGES: Self = Self::new(
        "too_many_images",
        "The request contains more images than allowed",
        StatusCode::BAD_REQUEST,
    );
    // 404 Not Found
    pub const NOT_FOUND: Self = Self::new(
        "not_found",
        "The requested resource was not found",
        StatusCode::NOT_FOUND,
    );
    // 413 Payload Too Large
    pub const ARCHIVE_TOO_LARGE: Self = Self::new(
        "archive_too_large",
        "The archive exceeds the maximum allowed size",
        StatusCode::PAYLOAD_TOO_LARGE,
    );
    pub const PAYLOAD_TOO_LARGE: Self = Self::new(
        "payload_too_large",
        "The upload exceeds the maximum allowed size",
        StatusCode::PAYLOAD_TOO_LARGE,
    );
    // 422 Unprocessable Entity
    pub const UNSAFE_CONTENT: Self = Self::new(
        "unsafe_content",
        "The archive contains unsafe entries and was not extracted",
        StatusCode::UNPROCESSABLE_ENTITY,
    );
    pub const NO_IMAGES_FOUND: Self = Self::new(
        "no_images_found",
        "No PNG or JPEG images were found in the archive",
        StatusCode::UNPROCESSABLE_ENTITY,
    );
    pub const ARCHIVE_DECODE_FAILED: Self = Self::new(
        "archive_decode_failed",
        "The archive could not be decoded",
        StatusCode::UNPROCESSABLE_ENTITY,
    );
    // 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "An internal server error occurred. Please try again later",
        StatusCode::INTERNAL_SERVER_ERROR,
    );

    /// Creates a new error response.
    #[inline]
    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            resource: None,
            context: None,
            status,
        }
    }

    /// Sets the resource, joining with `/` if one is already present.
    pub fn with_resource(mut self, resource: impl Into<Cow<'a, str>>) -> Self {
        let new_resource = resource.into();
        self.resource = Some(match self.resource {
            Some(existing) => Cow::Owned(format!("{existing}/{new_resource}")),
            None => new_resource,
        });
        self
    }

    /// Appends a sentence to the message.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        let new_message = message.into();
        self.message = Cow::Owned(format!("{}. {}", self.message, new_message));
        self
    }

    /// Attaches context, joining with `; ` if some is already present.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        let new_context = context.into();
        self.context = Some(match self.context {
            Some(existing) => Cow::Owned(format!("{existing}; {new_context}")),
            None => new_context,
        });
        self
    }
}

impl Default for ErrorResponse<'_> {
    #[inline]
    fn default() -> Self {
        Self::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ErrorResponse<'_> {
    #[inline]
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
