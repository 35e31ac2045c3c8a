//! Pipeline limits and scratch space.
//!
//! Every flag is optional; anything left unset keeps the default of
//! [`PipelineConfig`].

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Args;
use lumen_core::{PipelineConfig, PipelineConfigBuilderError};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// Command-line view of [`PipelineConfig`].
#[derive(Debug, Clone, Default, Args, Serialize, Deserialize)]
pub struct PipelineArgs {
    /// Ceiling for all directly uploaded images of one request, in bytes [default: 100 MiB].
    #[arg(long, env = "MAX_UPLOAD_SIZE")]
    pub max_upload_size: Option<u64>,

    /// Ceiling for the compressed archive, in bytes [default: 500 MiB].
    #[arg(long, env = "MAX_ARCHIVE_SIZE")]
    pub max_archive_size: Option<u64>,

    /// Maximum number of images per request [default: 50].
    #[arg(long, env = "MAX_IMAGES_PER_REQUEST")]
    pub max_images_per_request: Option<usize>,

    /// Ceiling for one decompressed archive entry, in bytes [default: 50 MiB].
    #[arg(long, env = "MAX_ENTRY_SIZE")]
    pub max_entry_size: Option<u64>,

    /// Ceiling for all decompressed bytes of one archive [default: 1 GiB].
    #[arg(long, env = "MAX_TOTAL_UNCOMPRESSED")]
    pub max_total_uncompressed: Option<u64>,

    /// Ceiling for a single image payload, in bytes [default: 50 MiB].
    #[arg(long, env = "MAX_IMAGE_BYTES")]
    pub max_image_bytes: Option<u64>,

    /// Ceiling for image width and height, in pixels [default: 16384].
    #[arg(long, env = "MAX_IMAGE_DIMENSION")]
    pub max_image_dimension: Option<u32>,

    /// Simultaneous recognition calls across all requests [default: 4].
    #[arg(long = "max-concurrent-ocr", env = "MAX_CONCURRENT_OCR")]
    pub max_concurrent_recognition: Option<NonZeroUsize>,

    /// Per-image recognition timeout in seconds, 0 disables it [default: 30].
    #[arg(long = "ocr-timeout-seconds", env = "OCR_TIMEOUT_SECONDS")]
    pub recognition_timeout_secs: Option<u64>,

    /// Root directory for per-request scratch space [default: ./temp].
    #[arg(long, env = "TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,
}

impl PipelineArgs {
    /// Builds a validated [`PipelineConfig`] from the given overrides.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, PipelineConfigBuilderError> {
        let mut builder = PipelineConfig::builder();

        if let Some(value) = self.max_upload_size {
            builder = builder.with_max_upload_size(value);
        }
        if let Some(value) = self.max_archive_size {
            builder = builder.with_max_archive_size(value);
        }
        if let Some(value) = self.max_images_per_request {
            builder = builder.with_max_images_per_request(value);
        }
        if let Some(value) = self.max_entry_size {
            builder = builder.with_max_entry_size(value);
        }
        if let Some(value) = self.max_total_uncompressed {
            builder = builder.with_max_total_uncompressed(value);
        }
        if let Some(value) = self.max_image_bytes {
            builder = builder.with_max_image_bytes(value);
        }
        if let Some(value) = self.max_image_dimension {
            builder = builder.with_max_image_dimension(value);
        }
        if let Some(value) = self.max_concurrent_recognition {
            builder = builder.with_max_concurrent_recognition(value);
        }
        if let Some(value) = self.recognition_timeout_secs {
            builder = builder.with_recognition_timeout_secs(value);
        }
        if let Some(value) = &self.temp_dir {
            builder = builder.with_temp_dir(value.clone());
        }

        builder.build()
    }

    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            max_upload_size = ?self.max_upload_size,
            max_archive_size = ?self.max_archive_size,
            max_images_per_request = ?self.max_images_per_request,
            max_concurrent_ocr = ?self.max_concurrent_recognition,
            ocr_timeout_secs = ?self.recognition_timeout_secs,
            temp_dir = ?self.temp_dir,
            "pipeline overrides"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_overrides_yield_defaults() -> anyhow::Result<()> {
        let config = PipelineArgs::default().to_pipeline_config()?;
        assert_eq!(config, PipelineConfig::default());
        Ok(())
    }

    #[test]
    fn overrides_are_applied() -> anyhow::Result<()> {
        let args = PipelineArgs {
            max_images_per_request: Some(5),
            max_concurrent_recognition: NonZeroUsize::new(2),
            recognition_timeout_secs: Some(0),
            temp_dir: Some(PathBuf::from("/tmp/lumen-test")),
            ..PipelineArgs::default()
        };

        let config = args.to_pipeline_config()?;
        assert_eq!(config.max_images_per_request, 5);
        assert_eq!(config.max_concurrent_recognition.get(), 2);
        assert_eq!(config.recognition_timeout(), None);
        assert_eq!(config.temp_dir, PathBuf::from("/tmp/lumen-test"));
        Ok(())
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let zero_images = PipelineArgs {
            max_images_per_request: Some(0),
            ..PipelineArgs::default()
        };
        assert!(zero_images.to_pipeline_config().is_err());

        let entry_above_total = PipelineArgs {
            max_entry_size: Some(10),
            max_total_uncompressed: Some(5),
            ..PipelineArgs::default()
        };
        assert!(entry_above_total.to_pipeline_config().is_err());
    }
}
