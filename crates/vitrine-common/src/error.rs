//! Common error types used throughout vitrine.
//!
//! This module provides a unified error type covering the failure cases the
//! photo workflow can surface: validation rejections (bad format, size limit,
//! unknown references), conflicts (stale snapshot, occupied carousel slot),
//! storage and database failures.

use crate::ids::{PhotoId, ProductId};

/// Common error type for vitrine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested product or photo was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The declared MIME type is not an accepted image format.
    #[error("Invalid image format: {0}")]
    InvalidFormat(String),

    /// The upload exceeds the maximum allowed size.
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    /// The upload bytes do not decode as a valid image.
    #[error("Image decode failed: {0}")]
    Decode(String),

    /// Staging the operation would push the photo set past its limit.
    #[error("Photo limit exceeded: at most {limit} photos per product")]
    PhotoLimitExceeded { limit: usize },

    /// A staged operation referenced a photo that is not in the effective view.
    #[error("Unknown photo reference: {0}")]
    UnknownPhotoReference(PhotoId),

    /// The session's base version no longer matches the committed state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A carousel slot is already held by another product.
    #[error("Carousel slot {position} already held by product {holder}")]
    SlotTaken { position: u32, holder: ProductId },

    /// A rendition store read or write failed after retries.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new Storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new Conflict error.
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for the validation family of errors (no state change,
    /// caller must fix the request).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_)
                | Self::FileTooLarge { .. }
                | Self::Decode(_)
                | Self::PhotoLimitExceeded { .. }
                | Self::InvalidInput(_)
        )
    }

    /// Returns true for conflicts that resolve by refreshing and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::SlotTaken { .. })
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("photo abc");
        assert_eq!(err.to_string(), "Not found: photo abc");

        let err = Error::FileTooLarge {
            size: 6 * 1024 * 1024,
            limit: 5 * 1024 * 1024,
        };
        assert_eq!(
            err.to_string(),
            "File too large: 6291456 bytes (limit 5242880)"
        );

        let err = Error::PhotoLimitExceeded { limit: 5 };
        assert_eq!(
            err.to_string(),
            "Photo limit exceeded: at most 5 photos per product"
        );

        let err = Error::database("connection failed");
        assert_eq!(err.to_string(), "Database error: connection failed");
    }

    #[test]
    fn test_slot_taken_display() {
        let holder = ProductId::new();
        let err = Error::SlotTaken {
            position: 3,
            holder,
        };
        assert_eq!(
            err.to_string(),
            format!("Carousel slot 3 already held by product {holder}")
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_validation_family() {
        assert!(Error::InvalidFormat("text/plain".into()).is_validation());
        assert!(Error::Decode("truncated".into()).is_validation());
        assert!(Error::PhotoLimitExceeded { limit: 5 }.is_validation());
        assert!(!Error::conflict("stale").is_validation());
    }

    #[test]
    fn test_conflict_family() {
        assert!(Error::conflict("stale version").is_conflict());
        assert!(Error::SlotTaken {
            position: 1,
            holder: ProductId::new()
        }
        .is_conflict());
        assert!(!Error::not_found("x").is_conflict());
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::not_found("photo");
        assert!(matches!(err, Error::NotFound(_)));

        let err = Error::storage("write failed");
        assert!(matches!(err, Error::Storage(_)));

        let err = Error::conflict("stale");
        assert!(matches!(err, Error::Conflict(_)));

        let err = Error::internal("bug");
        assert!(matches!(err, Error::Internal(_)));
    }
}
