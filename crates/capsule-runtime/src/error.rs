//! Error types for the capsule runtime.

use std::io;
use thiserror::Error;

/// Errors that can occur while finding or loading units.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// No artifact exists at the searched location.
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    /// The artifact exists but could not be read.
    #[error("Inaccessible artifact {path}: {source}")]
    InaccessibleArtifact {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Compiled cache has a bad magic number, truncated magic or an undecodable body.
    #[error("Corrupt cache {path}: {reason}")]
    CorruptCache { path: String, reason: String },

    /// Compiled cache ended before the modification time field.
    #[error("Incomplete cache {0}: truncated modification time")]
    IncompleteCache(String),

    /// Compiled cache does not match its source artifact.
    #[error("Stale cache {path}: cached mtime {cached}, source mtime {source_mtime}")]
    StaleCache {
        path: String,
        cached: u32,
        source_mtime: u32,
    },

    /// The dynamic loader refused the library.
    #[error("Dynamic load failure: {0}")]
    DynamicLoadFailure(String),

    /// The library loaded but does not export the expected entry point.
    #[error("Entry point {symbol} not found: {message}")]
    EntryPointNotFound { symbol: String, message: String },

    /// Path escapes the owning handle's root or is otherwise unusable.
    #[error("Bad path: {0}")]
    BadPath(String),

    /// Open mode requests write access.
    #[error("Bad mode: {0}")]
    BadMode(String),

    /// Operation on a handle that was already closed.
    #[error("Closed handle: {0}")]
    ClosedHandle(String),

    /// The handle's rights do not permit the operation.
    #[error("Right '{right}' not granted on {handle}")]
    RightsDenied { handle: String, right: String },

    /// Unit source could not be parsed.
    #[error("Syntax error in {origin} line {line}: {message}")]
    Syntax {
        origin: String,
        line: usize,
        message: String,
    },

    /// Unit initialization code failed.
    #[error("Execution of {unit} failed: {message}")]
    ExecutionFailed { unit: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoaderError {
    /// Map an I/O failure on an artifact to the missing/inaccessible pair.
    pub fn from_artifact_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::NotFound {
            LoaderError::MissingArtifact(format!("{}: {}", path, err))
        } else {
            LoaderError::InaccessibleArtifact { path, source: err }
        }
    }

    /// Whether a compiled cache failure may be answered with the source form.
    pub fn is_cache_recoverable(&self) -> bool {
        matches!(
            self,
            LoaderError::MissingArtifact(_)
                | LoaderError::CorruptCache { .. }
                | LoaderError::IncompleteCache(_)
                | LoaderError::StaleCache { .. }
        )
    }

    /// Whether this error means "nothing there" as opposed to "broken".
    pub fn is_not_found(&self) -> bool {
        match self {
            LoaderError::MissingArtifact(_) => true,
            LoaderError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for loader operations.
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_io_mapping() {
        let missing = LoaderError::from_artifact_io(
            "/r/a.src",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(missing, LoaderError::MissingArtifact(_)));

        let denied = LoaderError::from_artifact_io(
            "/r/a.src",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(denied, LoaderError::InaccessibleArtifact { .. }));
        assert!(!denied.is_cache_recoverable());
    }

    #[test]
    fn test_cache_recoverable_kinds() {
        assert!(LoaderError::IncompleteCache("x".into()).is_cache_recoverable());
        assert!(LoaderError::StaleCache {
            path: "x".into(),
            cached: 1,
            source_mtime: 2
        }
        .is_cache_recoverable());
        assert!(!LoaderError::BadPath("x".into()).is_cache_recoverable());
        assert!(!LoaderError::ExecutionFailed {
            unit: "x".into(),
            message: "boom".into()
        }
        .is_cache_recoverable());
    }
}
