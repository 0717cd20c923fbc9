//! Error types for vicinity.
//!
//! The crate uses a hierarchical error system:
//! - [`VicinityError`] is the top-level error returned by all public APIs
//! - Specific error types ([`StorageError`], [`ValidationError`]) provide detail
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use vicinity::{VectorDatabase, Result};
//!
//! fn example() -> Result<()> {
//!     let mut db = VectorDatabase::new()?;
//!     db.load("./data", true, None)?;
//!     // ... operations that may fail ...
//!     db.close()?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::VectorId;

/// Result type alias for vicinity operations.
pub type Result<T> = std::result::Result<T, VicinityError>;

/// Top-level error enum for all vicinity operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum VicinityError {
    /// Storage layer error (I/O framing, corruption, versioning).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The requested algorithm lacks a required capability, or the search
    /// service does not maintain an index for it.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding generation/validation error.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The operation was cancelled via a cancellation token.
    #[error("Operation cancelled")]
    Cancelled,
}

impl VicinityError {
    /// Creates a not-supported error with the given message.
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Creates an embedding error with the given message.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a not-supported error.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this error indicates a corrupted or unreadable file.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Storage(
                StorageError::Corrupted(_)
                    | StorageError::UnsupportedVersion { .. }
                    | StorageError::UnresolvedVector(_)
            )
        )
    }

    /// Returns true if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if a search wrapper should re-raise this error to the
    /// caller instead of degrading to an empty result set.
    ///
    /// Validation and not-supported errors are always surfaced so callers
    /// can distinguish "no results" from "malformed request".
    pub(crate) fn must_surface(&self) -> bool {
        self.is_validation() || self.is_not_supported()
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the persisted database or index files.
#[derive(Debug, Error)]
pub enum StorageError {
    /// File content is corrupted or structurally invalid.
    #[error("Database corrupted: {0}")]
    Corrupted(String),

    /// Database file not found at the expected path.
    #[error("Database file not found: {0}")]
    FileNotFound(PathBuf),

    /// File carries a version tag this build does not understand.
    ///
    /// Unknown future versions fail closed rather than attempt a
    /// best-effort partial read.
    #[error("Unsupported file version: {found} (max supported: {supported})")]
    UnsupportedVersion {
        /// Version tag found in the file.
        found: i32,
        /// Highest version this build can read.
        supported: i32,
    },

    /// An index file referenced a vector id absent from the collection.
    #[error("Index references unknown vector: {0}")]
    UnresolvedVector(VectorId),

    /// Serialization/deserialization of a vector payload failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A lock guarding the database state was poisoned by a panicking thread.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

// Convert bincode payload errors to StorageError
impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to VicinityError for convenience
impl From<bincode::Error> for VicinityError {
    fn from(err: bincode::Error) -> Self {
        VicinityError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller and are
/// always raised synchronously, never swallowed.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field or argument has an invalid value.
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument {
        /// Name of the invalid argument.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// Query dimension doesn't match the indexed vectors.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },
}

impl ValidationError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VicinityError::not_supported("ball tree has no native range search");
        assert_eq!(
            err.to_string(),
            "Not supported: ball tree has no native range search"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::UnsupportedVersion {
            found: 7,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported file version: 7 (max supported: 1)"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::invalid_argument("k", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Invalid argument 'k': must be greater than 0"
        );
    }

    #[test]
    fn test_is_validation() {
        let err: VicinityError = ValidationError::invalid_argument("radius", "negative").into();
        assert!(err.is_validation());
        assert!(!err.is_not_supported());
        assert!(err.must_surface());
    }

    #[test]
    fn test_is_corruption() {
        let err: VicinityError = StorageError::corrupted("truncated index section").into();
        assert!(err.is_corruption());
        assert!(err.is_storage());
        assert!(!err.must_surface());
    }

    #[test]
    fn test_unresolved_vector_is_corruption() {
        let id = VectorId::new();
        let err: VicinityError = StorageError::UnresolvedVector(id).into();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_error_conversion_chain() {
        fn inner() -> Result<()> {
            Err(StorageError::corrupted("test corruption"))?
        }

        let result = inner();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_storage());
    }
}
