//! Content-based image validation.
//!
//! Validation never fails: every entry yields a [`ValidationVerdict`] that is
//! either accepted or rejected with a [`RejectReason`]. Rejected entries are
//! reported per item and never reach recognition.

use std::io::Cursor;

use image::{ImageError, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

use crate::TRACING_TARGET_VALIDATE;
use crate::entry::ImageEntry;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
const JPEG_MAGIC: &[u8] = &[0xff, 0xd8, 0xff];

/// Ceilings applied to each candidate image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    max_bytes: u64,
    max_dimension: u32,
}

impl ImageLimits {
    pub fn new(max_bytes: u64, max_dimension: u32) -> Self {
        Self {
            max_bytes,
            max_dimension,
        }
    }

    #[inline]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    #[inline]
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn decoder_limits(&self) -> Limits {
        let side = u64::from(self.max_dimension);
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(side.saturating_mul(side).saturating_mul(4));
        limits
    }
}

/// Raster formats accepted for recognition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    /// Identifies the format from leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Why a candidate image was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    #[error("image payload is empty")]
    EmptyPayload,

    #[error("content is neither PNG nor JPEG")]
    UnsupportedFormat,

    #[error("{detail}")]
    TooLarge { detail: String },

    #[error("{detail}")]
    Corrupt { detail: String },
}

impl RejectReason {
    /// Returns the per-item reason code.
    pub fn code(&self) -> &'static str {
        self.into()
    }

    fn too_large(detail: impl Into<String>) -> Self {
        Self::TooLarge {
            detail: detail.into(),
        }
    }

    fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }
}

/// Result of validating one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted {
        format: RasterFormat,
        width: u32,
        height: u32,
    },
    Rejected(RejectReason),
}

/// An entry paired with its validation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub entry: ImageEntry,
    pub outcome: ValidationOutcome,
}

impl ValidationVerdict {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, ValidationOutcome::Accepted { .. })
    }

    /// Returns the rejection reason, if any.
    pub fn rejection(&self) -> Option<&RejectReason> {
        match &self.outcome {
            ValidationOutcome::Rejected(reason) => Some(reason),
            ValidationOutcome::Accepted { .. } => None,
        }
    }
}

/// Checks that entries are well-formed PNG or JPEG images within limits.
#[derive(Debug, Clone)]
pub struct ImageValidator {
    limits: ImageLimits,
}

impl ImageValidator {
    pub fn new(limits: ImageLimits) -> Self {
        Self { limits }
    }

    #[inline]
    pub fn limits(&self) -> &ImageLimits {
        &self.limits
    }

    /// Validates one entry. The first failing check decides the reason.
    ///
    /// Decoding is CPU bound; call this from a blocking thread.
    pub fn validate(&self, entry: ImageEntry) -> ValidationVerdict {
        let outcome = match self.check(entry.bytes()) {
            Ok((format, width, height)) => ValidationOutcome::Accepted {
                format,
                width,
                height,
            },
            Err(reason) => {
                tracing::debug!(
                    target: TRACING_TARGET_VALIDATE,
                    filename = entry.filename(),
                    reason = reason.code(),
                    detail = %reason,
                    "image rejected"
                );
                ValidationOutcome::Rejected(reason)
            }
        };

        ValidationVerdict { entry, outcome }
    }

    /// Validates entries in order.
    pub fn validate_all(&self, entries: Vec<ImageEntry>) -> Vec<ValidationVerdict> {
        let verdicts: Vec<_> = entries.into_iter().map(|e| self.validate(e)).collect();
        let accepted = verdicts.iter().filter(|v| v.is_accepted()).count();

        tracing::debug!(
            target: TRACING_TARGET_VALIDATE,
            total = verdicts.len(),
            accepted,
            "validation finished"
        );

        verdicts
    }

    fn check(&self, bytes: &[u8]) -> Result<(RasterFormat, u32, u32), RejectReason> {
        if bytes.is_empty() {
            return Err(RejectReason::EmptyPayload);
        }

        let format = RasterFormat::sniff(bytes).ok_or(RejectReason::UnsupportedFormat)?;

        let size = bytes.len() as u64;
        if size > self.limits.max_bytes {
            return Err(RejectReason::too_large(format!(
                "image is {size} bytes, the limit is {}",
                self.limits.max_bytes
            )));
        }

        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format.image_format())
            .into_dimensions()
            .map_err(|err| RejectReason::corrupt(format!("unreadable image header: {err}")))?;

        let max = self.limits.max_dimension;
        if width > max || height > max {
            return Err(RejectReason::too_large(format!(
                "image is {width}x{height} pixels, the limit is {max}x{max}"
            )));
        }

        let mut reader = ImageReader::with_format(Cursor::new(bytes), format.image_format());
        reader.limits(self.limits.decoder_limits());
        reader.decode().map_err(|err| match err {
            ImageError::Limits(err) => RejectReason::too_large(err.to_string()),
            other => RejectReason::corrupt(format!("failed to decode image: {other}")),
        })?;

        Ok((format, width, height))
    }
}
