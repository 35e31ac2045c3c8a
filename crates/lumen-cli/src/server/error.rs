//! Startup and runtime errors with recovery suggestions.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for server operations.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The scratch root could not be created or swept.
    #[error("Failed to prepare temp root {}: {source}", path.display())]
    TempRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Runtime server error.
    #[error("Runtime error: {0}")]
    Runtime(#[source] io::Error),
}

impl ServerError {
    pub fn temp_root(path: &Path, source: io::Error) -> Self {
        Self::TempRoot {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn bind_error(address: &str, source: io::Error) -> Self {
        Self::BindError {
            address: address.to_owned(),
            source,
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::TempRoot { source, .. } | Self::BindError { source, .. } => source.kind(),
            Self::Runtime(err) => err.kind(),
        }
    }

    /// Returns a unique error code for this error type.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::TempRoot { .. } => "E001",
            Self::BindError { .. } => "E002",
            Self::Runtime(_) => "E003",
        }
    }

    /// Whether retrying after an environment change might succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TempRoot { .. } => matches!(
                self.io_kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::StorageFull
            ),
            Self::BindError { .. } => matches!(
                self.io_kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::AddrInUse
                    | io::ErrorKind::AddrNotAvailable
            ),
            Self::Runtime(_) => matches!(
                self.io_kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
        }
    }

    /// Provides a human-readable suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match (self, self.io_kind()) {
            (Self::TempRoot { .. }, io::ErrorKind::PermissionDenied) => {
                Some("Point TEMP_DIR at a directory the server user can write to")
            }
            (Self::TempRoot { .. }, io::ErrorKind::StorageFull) => {
                Some("Free disk space on the volume holding TEMP_DIR")
            }
            (Self::TempRoot { .. }, _) => Some("Check that TEMP_DIR is a valid directory path"),
            (Self::BindError { .. }, io::ErrorKind::PermissionDenied) => {
                Some("Try using a port above 1024 or run with appropriate privileges")
            }
            (Self::BindError { .. }, io::ErrorKind::AddrInUse) => Some(
                "The port is already in use. Try a different port or stop the conflicting service",
            ),
            (Self::BindError { .. }, io::ErrorKind::AddrNotAvailable) => {
                Some("The address is not available. Check network interface configuration")
            }
            (Self::BindError { .. }, _) => Some("Check network configuration and firewall settings"),
            (Self::Runtime(_), io::ErrorKind::Interrupted) => {
                Some("The operation was interrupted, you may retry")
            }
            (Self::Runtime(_), _) => None,
        }
    }

    /// Returns key-value pairs for structured logging.
    pub fn context(&self) -> Vec<(&'static str, String)> {
        let mut context = vec![("error_code", self.error_code().to_owned())];

        if let Some(suggestion) = self.suggestion() {
            context.push(("suggestion", suggestion.to_owned()));
        }

        context.push(("recoverable", self.is_recoverable().to_string()));
        context.push(("io_error_kind", format!("{:?}", self.io_kind())));

        match self {
            Self::TempRoot { path, .. } => context.push(("path", path.display().to_string())),
            Self::BindError { address, .. } => context.push(("address", address.clone())),
            Self::Runtime(_) => {}
        }

        context
    }
}
