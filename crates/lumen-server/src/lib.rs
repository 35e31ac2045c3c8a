#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for request handlers.
pub const TRACING_TARGET_HANDLER: &str = "lumen_server::handler";

/// Tracing target for HTTP request spans.
pub const TRACING_TARGET_HTTP: &str = "lumen_server::http";

/// Tracing target for middleware error recovery.
pub const TRACING_TARGET_RECOVERY_ERROR: &str = "lumen_server::recovery::error";

/// Tracing target for handler panic recovery.
pub const TRACING_TARGET_RECOVERY_PANIC: &str = "lumen_server::recovery::panic";

pub mod handler;
pub mod middleware;
pub mod service;
