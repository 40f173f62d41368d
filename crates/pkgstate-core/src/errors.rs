//! Error types for the pkgstate core library.

use std::path::PathBuf;

use crate::models::PackageIdentity;

/// Top-level error enum for the pkgstate core library.
///
/// A missing credential is never an error: lookups return `None` instead.
#[derive(Debug, thiserror::Error)]
pub enum PkgStateError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("is a directory: {}", .0.display())]
    IsADirectory(PathBuf),

    #[error("no such file or directory: {}", .0.display())]
    NoSuchFileOrDirectory(PathBuf),

    #[error("mirror not found for '{0}'")]
    MirrorNotFound(String),

    #[error("package '{0}' is not pinned")]
    NotPinned(PackageIdentity),

    #[error("autopin is enabled; pins are managed by dependency resolution")]
    AutoPinEnabled,

    #[error("unsupported {document} schema version {found}")]
    UnsupportedSchemaVersion { document: &'static str, found: i64 },

    #[error("malformed document {}: {reason}", path.display())]
    MalformedDocument { path: PathBuf, reason: String },

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PkgStateError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type PkgStateResult<T> = Result<T, PkgStateError>;
