#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for archive extraction.
pub const TRACING_TARGET_ARCHIVE: &str = "lumen_core::archive";

/// Tracing target for image validation.
pub const TRACING_TARGET_VALIDATE: &str = "lumen_core::validate";

/// Tracing target for batch recognition.
pub const TRACING_TARGET_BATCH: &str = "lumen_core::batch";

/// Tracing target for request-level pipeline events.
pub const TRACING_TARGET_PIPELINE: &str = "lumen_core::pipeline";

mod config;
mod entry;
mod error;
mod scratch;

pub mod archive;
pub mod batch;
pub mod pipeline;
pub mod recognize;
pub mod report;
pub mod validate;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod fixtures;

pub use crate::config::{PipelineConfig, PipelineConfigBuilder, PipelineConfigBuilderError};
pub use crate::entry::{EntrySource, ImageEntry};
pub use crate::error::{Error, ErrorCategory, Result};
pub use crate::pipeline::{ArchiveUpload, BatchRequest, ImageUpload, Pipeline};
pub use crate::report::{BatchReport, BatchStatus};
pub use crate::scratch::{SCRATCH_PREFIX, prepare_temp_root, scratch_dir, sweep_temp_root};
