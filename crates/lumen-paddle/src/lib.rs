#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for client lifecycle and retries.
pub const TRACING_TARGET_CLIENT: &str = "lumen_paddle::client";

/// Tracing target for individual HTTP exchanges.
pub const TRACING_TARGET_HTTP: &str = "lumen_paddle::http";

mod client;
mod error;

pub use crate::client::{OcrResponse, PdClient, PdConfig};
pub use crate::error::{Error, Result};
