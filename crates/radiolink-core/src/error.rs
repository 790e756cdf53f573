//! Error types for Radiolink.

use std::path::PathBuf;

/// Result type for Radiolink operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Radiolink error types.
///
/// Every variant maps to a stable integer through [`Error::code`], which is
/// what foreign callers compare against.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required parameter was empty or missing.
    #[error("Missing parameter: {0}")]
    MissingParam(&'static str),

    /// The instance is shut down, or the request is not valid for it.
    #[error("Invalid instance: {0}")]
    Invalid(String),

    /// The operation is compiled out or disabled on the instance.
    #[error("Operation not implemented")]
    NotImplemented,

    /// The plugin is already loaded for this owner.
    #[error("Plugin already loaded: {}", .0.display())]
    InUse(PathBuf),

    /// Allocation failed.
    #[error("Out of memory")]
    NoMemory,

    /// The module could not be opened or is not a valid plugin.
    #[error("Failed to open plugin {}: {reason}", .path.display())]
    OpenFailed { path: PathBuf, reason: String },

    /// The plugin registry has been torn down.
    #[error("Plugin registry unavailable")]
    RegistryUnavailable,

    /// A plugin task could not be started.
    #[error("Failed to start thread: {0}")]
    Thread(#[source] std::io::Error),

    /// The plugin path could not be resolved.
    #[error("Failed to resolve {}: {source}", .path.display())]
    Failed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plugin lies outside the configured plugin directories.
    #[error("Plugin path not allowed: {}", .0.display())]
    NotAllowed(PathBuf),

    /// A named item (mode, monitored thread) does not exist.
    #[error("Not found: {0}")]
    NotExists(String),

    /// The plugin's own init hook reported failure.
    #[error("Plugin init returned {0}")]
    Unknown(i32),
}

impl Error {
    /// Stable integer code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::Unknown(_) => codes::UNKNOWN,
            Error::NoMemory => codes::NO_MEMORY,
            Error::RegistryUnavailable => codes::REGISTRY,
            Error::Thread(_) => codes::THREAD,
            Error::MissingParam(_) => codes::MISSING_PARAM,
            Error::Invalid(_) | Error::NotAllowed(_) => codes::INVALID,
            Error::InUse(_) => codes::IN_USE,
            Error::Failed { .. } => codes::FAILED,
            Error::NotExists(_) => codes::NOT_EXISTS,
            Error::NotImplemented => codes::NOT_IMPLEMENTED,
            Error::OpenFailed { .. } => codes::OPEN_FAILED,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::Invalid(msg.into())
    }

    #[cfg_attr(not(feature = "plugins"), allow(dead_code))]
    pub(crate) fn open_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::OpenFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Integer error codes shared with non-Rust callers.
pub mod codes {
    pub const NONE: i32 = 0;
    pub const UNKNOWN: i32 = -1;
    pub const NO_MEMORY: i32 = -2;
    pub const REGISTRY: i32 = -8;
    pub const THREAD: i32 = -9;
    pub const MISSING_PARAM: i32 = -11;
    pub const INVALID: i32 = -12;
    pub const IN_USE: i32 = -15;
    pub const FAILED: i32 = -18;
    pub const NOT_EXISTS: i32 = -20;
    pub const NOT_IMPLEMENTED: i32 = -23;
    pub const OPEN_FAILED: i32 = -29;
}

/// Convert a result into its integer code (0 on success).
pub fn result_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => codes::NONE,
        Err(e) => e.code(),
    }
}
