//! # Error Handling
//!
//! This module defines the centralized error type for `overlay-render`. It uses
//! `thiserror` to derive a single `Error` enum covering every failure mode of
//! the storage layer, the overlay composition, the render orchestration and the
//! configuration surface.
//!
//! ## Categories
//!
//! - **Construction-time validation** (`InvalidSource`, `Config`,
//!   `ConfigParse`): reported before any filesystem or builder work happens.
//! - **Filesystem** (`NotFound`, `ReadOnly`, `Filesystem`, `Io`, `Overlay`,
//!   `OverlayWrite`): always carry the offending path.
//! - **Render stages** (`PathMustBeDirectory`, `DescriptorLoad`,
//!   `WarningRejected`, `BuildFailed`, `PluginFailed`, `SerializationFailed`):
//!   the orchestrator's own taxonomy. Builder and plugin failures wrap the
//!   underlying error together with the render path.
//! - **Builder internals** (`LoadRestriction`, `Build`): produced by builder
//!   implementations and surfaced wrapped in `BuildFailed`.
//!
//! Cache malfunctions never appear here: the cache degrades to a miss instead.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for overlay-render operations
#[derive(Error, Debug)]
pub enum Error {
    /// A render source failed validation before any work was attempted.
    #[error("Invalid source: {message}")]
    InvalidSource { message: String },

    /// Renderer options failed validation.
    #[error("Invalid renderer configuration: {message}")]
    Config { message: String },

    /// An error occurred while parsing a render configuration file.
    ///
    /// This error includes the specific parsing issue and optionally a hint
    /// about how to fix it.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// The requested path does not exist in the storage backend.
    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A mutating call was made against a read-only storage backend.
    #[error("{operation} not supported on read-only filesystem: {}", path.display())]
    ReadOnly {
        operation: &'static str,
        path: PathBuf,
    },

    /// A storage operation failed for a reason other than a missing path.
    #[error("Filesystem operation error on {}: {message}", path.display())]
    Filesystem { path: PathBuf, message: String },

    /// An I/O error from the host filesystem, with the path it concerned.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The overlay filesystem could not be composed.
    #[error("Overlay composition error: {message}")]
    Overlay { message: String },

    /// Pre-populating the overlay with an override failed.
    #[error("Failed to write override {}: {source}", path.display())]
    OverlayWrite {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// The render path resolved to a file instead of a directory.
    #[error("Path {} must be a directory containing a kustomization file, got a file instead", path.display())]
    PathMustBeDirectory { path: PathBuf },

    /// The descriptor of an overlay root could not be read or parsed.
    #[error("Unable to read kustomization from path {}: {message}", path.display())]
    DescriptorLoad { path: PathBuf, message: String },

    /// The warning handler declined to continue after deprecation warnings.
    #[error("kustomize warnings detected:\n{}", warnings.join("\n"))]
    WarningRejected { warnings: Vec<String> },

    /// A logging warning handler could not write to its sink.
    #[error("Failed to write warning: {source}")]
    WarningWrite {
        #[source]
        source: std::io::Error,
    },

    /// The builder failed for the given render path.
    #[error("Failed to run kustomize for path {}: {source}", path.display())]
    BuildFailed {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// A build-time plugin failed for the given render path.
    #[error("Failed to apply plugin {plugin} for path {}: {source}", path.display())]
    PluginFailed {
        path: PathBuf,
        plugin: String,
        #[source]
        source: Box<Error>,
    },

    /// Re-encoding the descriptor or the values manifest failed.
    #[error("Failed to serialize {what}: {message}")]
    SerializationFailed { what: String, message: String },

    /// A builder tried to load a file outside the permitted root.
    #[error("Security: file {} is not in or below {}", path.display(), root.display())]
    LoadRestriction { path: PathBuf, root: PathBuf },

    /// A builder rejected its input.
    #[error("Build error: {message}")]
    Build { message: String },

    /// A filter or transformer failed while post-processing documents.
    #[error("{stage} error: {message}")]
    Pipeline { stage: &'static str, message: String },

    /// The render was cancelled before it completed.
    #[error("Render cancelled")]
    Cancelled,

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON encoding error, wrapped from `serde_json::Error`.
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Build an `Error` from an `std::io::Error`, mapping missing paths to
    /// [`Error::NotFound`].
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound { path }
        } else {
            Error::Io { path, source }
        }
    }

    /// Returns true if this error (or the error it wraps) reports a missing path.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Error::OverlayWrite { source, .. } | Error::BuildFailed { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// Returns true if this error (or the error it wraps) comes from a
    /// read-only backend.
    pub fn is_read_only(&self) -> bool {
        match self {
            Error::ReadOnly { .. } => true,
            Error::OverlayWrite { source, .. } => source.is_read_only(),
            _ => false,
        }
    }

    /// Returns true if the warning handler rejected the render.
    pub fn is_warning_rejection(&self) -> bool {
        matches!(self, Error::WarningRejected { .. })
    }

    /// Returns true if the render path pointed at a file.
    pub fn is_path_must_be_directory(&self) -> bool {
        matches!(self, Error::PathMustBeDirectory { .. })
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
