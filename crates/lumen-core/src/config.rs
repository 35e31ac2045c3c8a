use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveLimits;
use crate::validate::ImageLimits;

/// Default values for configuration options.
mod defaults {
    use std::num::NonZeroUsize;
    use std::path::PathBuf;

    const MIB: u64 = 1024 * 1024;

    /// Default ceiling for direct image uploads in one request.
    pub const MAX_UPLOAD_SIZE: u64 = 100 * MIB;

    /// Default ceiling for the compressed archive size.
    pub const MAX_ARCHIVE_SIZE: u64 = 500 * MIB;

    /// Default number of images accepted per request.
    pub const MAX_IMAGES_PER_REQUEST: usize = 50;

    /// Default ceiling for a single decompressed archive entry.
    pub const MAX_ENTRY_SIZE: u64 = 50 * MIB;

    /// Default ceiling for all decompressed bytes of one archive.
    pub const MAX_TOTAL_UNCOMPRESSED: u64 = 1024 * MIB;

    /// Default ceiling for a single image payload.
    pub const MAX_IMAGE_BYTES: u64 = 50 * MIB;

    /// Default ceiling for image width and height in pixels.
    pub const MAX_IMAGE_DIMENSION: u32 = 16_384;

    /// Default per-item recognition timeout in seconds.
    pub const RECOGNITION_TIMEOUT_SECS: u64 = 30;

    /// Default number of simultaneous recognition calls.
    pub fn max_concurrent_recognition() -> NonZeroUsize {
        NonZeroUsize::MIN.saturating_add(3)
    }

    /// Default root for scoped scratch directories.
    pub fn temp_dir() -> PathBuf {
        "./temp".into()
    }
}

/// Immutable pipeline configuration.
///
/// Built once at startup and shared by reference with every stage. Nothing in
/// the pipeline reads ambient or global settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[must_use = "config does nothing unless you use it"]
#[builder(
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct PipelineConfig {
    /// Maximum combined size of direct image uploads, in bytes.
    #[builder(default = "defaults::MAX_UPLOAD_SIZE")]
    pub max_upload_size: u64,

    /// Maximum compressed archive size, in bytes.
    #[builder(default = "defaults::MAX_ARCHIVE_SIZE")]
    pub max_archive_size: u64,

    /// Maximum number of images in one request, archive and direct combined.
    #[builder(default = "defaults::MAX_IMAGES_PER_REQUEST")]
    pub max_images_per_request: usize,

    /// Maximum decompressed size of one archive entry, in bytes.
    #[builder(default = "defaults::MAX_ENTRY_SIZE")]
    pub max_entry_size: u64,

    /// Maximum decompressed size of all archive entries, in bytes.
    #[builder(default = "defaults::MAX_TOTAL_UNCOMPRESSED")]
    pub max_total_uncompressed: u64,

    /// Maximum size of one image payload, in bytes.
    #[builder(default = "defaults::MAX_IMAGE_BYTES")]
    pub max_image_bytes: u64,

    /// Maximum image width and height, in pixels.
    #[builder(default = "defaults::MAX_IMAGE_DIMENSION")]
    pub max_image_dimension: u32,

    /// Number of recognition calls allowed in flight at once.
    #[builder(default = "defaults::max_concurrent_recognition()")]
    pub max_concurrent_recognition: NonZeroUsize,

    /// Per-item recognition timeout in seconds, `0` waits indefinitely.
    #[builder(default = "defaults::RECOGNITION_TIMEOUT_SECS")]
    pub recognition_timeout_secs: u64,

    /// Root directory for scoped scratch directories.
    #[builder(default = "defaults::temp_dir()")]
    pub temp_dir: PathBuf,
}

impl PipelineConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Returns the per-item recognition timeout, if any.
    #[must_use]
    pub fn recognition_timeout(&self) -> Option<Duration> {
        (self.recognition_timeout_secs > 0)
            .then(|| Duration::from_secs(self.recognition_timeout_secs))
    }

    /// Returns the limits applied while unpacking an archive.
    #[must_use]
    pub fn archive_limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_archive_size: self.max_archive_size,
            max_entry_size: self.max_entry_size,
            max_total_uncompressed: self.max_total_uncompressed,
            max_entries: self.max_images_per_request,
        }
    }

    /// Returns the limits applied to each candidate image.
    #[must_use]
    pub fn image_limits(&self) -> ImageLimits {
        ImageLimits::new(self.max_image_bytes, self.max_image_dimension)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_size: defaults::MAX_UPLOAD_SIZE,
            max_archive_size: defaults::MAX_ARCHIVE_SIZE,
            max_images_per_request: defaults::MAX_IMAGES_PER_REQUEST,
            max_entry_size: defaults::MAX_ENTRY_SIZE,
            max_total_uncompressed: defaults::MAX_TOTAL_UNCOMPRESSED,
            max_image_bytes: defaults::MAX_IMAGE_BYTES,
            max_image_dimension: defaults::MAX_IMAGE_DIMENSION,
            max_concurrent_recognition: defaults::max_concurrent_recognition(),
            recognition_timeout_secs: defaults::RECOGNITION_TIMEOUT_SECS,
            temp_dir: defaults::temp_dir(),
        }
    }
}

impl PipelineConfigBuilder {
    /// Rejects zero-valued ceilings and inconsistent archive limits.
    fn validate(builder: &PipelineConfigBuilder) -> Result<(), String> {
        let non_zero = [
            ("max_upload_size", builder.max_upload_size),
            ("max_archive_size", builder.max_archive_size),
            ("max_entry_size", builder.max_entry_size),
            ("max_total_uncompressed", builder.max_total_uncompressed),
            ("max_image_bytes", builder.max_image_bytes),
        ];

        for (name, value) in non_zero {
            if value == Some(0) {
                return Err(format!("{name} must be greater than 0"));
            }
        }

        if builder.max_images_per_request == Some(0) {
            return Err("max_images_per_request must be greater than 0".to_string());
        }

        if builder.max_image_dimension == Some(0) {
            return Err("max_image_dimension must be greater than 0".to_string());
        }

        if let Some(timeout) = builder.recognition_timeout_secs
            && timeout > 3600
        {
            return Err("recognition_timeout_secs cannot exceed 3600 seconds".to_string());
        }

        let entry = builder.max_entry_size.unwrap_or(defaults::MAX_ENTRY_SIZE);
        let total = builder
            .max_total_uncompressed
            .unwrap_or(defaults::MAX_TOTAL_UNCOMPRESSED);
        if entry > total {
            return Err(format!(
                "max_entry_size ({entry}) cannot exceed max_total_uncompressed ({total})"
            ));
        }

        if let Some(dir) = &builder.temp_dir
            && dir.as_os_str().is_empty()
        {
            return Err("temp_dir cannot be empty".to_string());
        }

        Ok(())
    }
}
