//! Error types and handling infrastructure for filesrc.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! the library error type. The binary adds context on top with `anyhow`.
//!
//! ## Design Principles
//!
//! - **OS context preserved**: filesystem failures always carry the `io::Error`
//! - **Distinct misconfiguration**: a path of the wrong node type is not an I/O failure
//! - **Aborting init**: any sub-step failure surfaces as one `Initialization` error

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for filesrc operations.
#[derive(Error, Debug)]
pub enum SourceError {
    /// open/stat/mkfifo/seek failures
    #[error("Filesystem operation failed: {message}")]
    Filesystem {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Path exists but is not the node type the selected opener expects
    #[error("Wrong resource type at {path}: expected {expected}")]
    WrongResourceType {
        path: PathBuf,
        expected: &'static str,
    },

    /// A privilege-requiring source was opened without sufficient privilege
    #[error("Insufficient privileges to open {path}")]
    Privilege {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A driver init sub-step failed; the whole init was rolled back
    #[error("Initialization failed during {stage}")]
    Initialization {
        stage: &'static str,
        #[source]
        source: Box<SourceError>,
    },

    /// Lifecycle operation issued in a state that does not allow it
    #[error("Invalid driver transition: cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Persist-state load/save errors
    #[error("Persist state error: {message}")]
    Persist { message: String },

    /// The downstream consumer is gone
    #[error("Downstream pipeline closed")]
    DownstreamClosed,
}

/// Standard Result type for filesrc operations.
pub type Result<T> = std::result::Result<T, SourceError>;

impl SourceError {
    /// Create a Filesystem error from an io::Error with additional context
    pub fn filesystem(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            message: message.into(),
            source,
        }
    }

    pub fn wrong_resource_type(path: impl Into<PathBuf>, expected: &'static str) -> Self {
        Self::WrongResourceType {
            path: path.into(),
            expected,
        }
    }

    pub fn privilege(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Privilege {
            path: path.into(),
            source,
        }
    }

    /// Wrap a sub-step failure as a driver initialization failure
    pub fn initialization(stage: &'static str, source: SourceError) -> Self {
        Self::Initialization {
            stage,
            source: Box::new(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist {
            message: message.into(),
        }
    }

    /// The innermost error, looking through `Initialization` wrappers
    pub fn root_cause(&self) -> &SourceError {
        match self {
            Self::Initialization { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// Automatic conversion from io::Error to SourceError
impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        let message = match err.kind() {
            std::io::ErrorKind::NotFound => "File not found",
            std::io::ErrorKind::PermissionDenied => "Permission denied",
            _ => "IO operation failed",
        };
        Self::Filesystem {
            message: message.to_string(),
            source: err,
        }
    }
}
