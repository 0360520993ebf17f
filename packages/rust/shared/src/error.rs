//! Error types for the module exporter.
//!
//! Library crates use [`ModExportError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! During an export run a root module that cannot be opened, any error that
//! is not [recoverable](ModExportError::is_recoverable), and
//! [`ModExportError::Serialization`] are fatal. Other open failures and
//! dangling links are collected into the traversal report and the run keeps
//! going.

use std::fmt;
use std::path::PathBuf;

/// Why a container could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    /// The path is empty or malformed.
    InvalidPath,
    /// No container exists at the path.
    NotFound,
    /// Another session holds an exclusive lock on the container.
    Locked,
    /// The container exists but its content could not be read.
    Unreadable(String),
}

impl fmt::Display for OpenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath => write!(f, "invalid path"),
            Self::NotFound => write!(f, "not found"),
            Self::Locked => write!(f, "exclusively locked"),
            Self::Unreadable(msg) => write!(f, "unreadable: {msg}"),
        }
    }
}

/// Top-level error type for all export operations.
#[derive(Debug, thiserror::Error)]
pub enum ModExportError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The host could not resolve or lock a container.
    #[error("cannot open container {path}: {reason}")]
    ContainerOpen { path: String, reason: OpenFailure },

    /// A container opened but its items could not be enumerated.
    #[error("cannot read items of container {path}: {message}")]
    ContainerRead { path: String, message: String },

    /// A relationship endpoint could not be resolved.
    #[error("dangling {link_type} link on {container}#{item}: {reason}")]
    LinkResolution {
        container: String,
        item: String,
        link_type: String,
        reason: String,
    },

    /// An attribute of an opaque kind (never surfaced, only traced).
    #[error("attribute {name:?} has unsupported kind {kind}")]
    UnsupportedAttributeType { name: String, kind: String },

    /// The assembled document could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run was stopped on request before anything was exported.
    #[error("export cancelled: {message}")]
    Cancelled { message: String },

    /// Data validation error (malformed export, invariant breach).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ModExportError>;

impl ModExportError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a container open failure.
    pub fn container_open(path: impl Into<String>, reason: OpenFailure) -> Self {
        Self::ContainerOpen {
            path: path.into(),
            reason,
        }
    }

    /// Create a dangling-link error.
    pub fn link_resolution(
        container: impl Into<String>,
        item: impl Into<String>,
        link_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::LinkResolution {
            container: container.into(),
            item: item.into(),
            link_type: link_type.into(),
            reason: reason.into(),
        }
    }

    /// Whether the export can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ContainerOpen { .. }
                | Self::ContainerRead { .. }
                | Self::LinkResolution { .. }
                | Self::UnsupportedAttributeType { .. }
        )
    }
}
