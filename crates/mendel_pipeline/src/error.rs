//! Error types for transforming, resolving and watching.

use std::path::PathBuf;

/// Errors returned by a [`Transformer`](crate::Transformer).
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The source could not be parsed.
    #[error("syntax error in {path}: {message}")]
    Syntax {
        /// The file being transformed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The transform failed for another reason.
    #[error("failed to transform {path}: {reason}")]
    Failed {
        /// The file being transformed.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors returned by a [`DepsResolver`](crate::DepsResolver).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No file in the lookup chain satisfies the specifier.
    #[error("Cannot find module '{specifier}' from '{from}'")]
    NotFound {
        /// The import specifier.
        specifier: String,
        /// Module id of the importing file.
        from: String,
    },
}

/// Errors raised while setting up filesystem watches.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The platform watcher failed.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// A watched directory could not be scanned.
    #[error("failed to scan {path}: {source}")]
    Io {
        /// The directory being scanned.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
