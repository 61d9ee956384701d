//! Document store collaborator
//!
//! The backup engine talks to the database only through [`DocumentStore`]:
//! list a collection, create-or-replace a batch of documents, delete a batch
//! of ids. Two implementations ship with the crate, an in-memory store and a
//! directory of JSON files.

pub mod file;
pub mod file_io;
pub mod memory;
pub mod value;

use std::fmt;

use thiserror::Error;

pub use file::FileStore;
pub use file_io::{read_json, write_json_atomic};
pub use memory::{MemoryStore, StoreOperation};
pub use value::{FromDateTime, StoreValue, StoredDocument, Timestamp, TimestampLike};

/// Maximum number of operations committed in one batch
pub const DEFAULT_BATCH_SIZE: usize = 400;

/// Classification of store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    PermissionDenied,
    NotFound,
    InvalidArgument,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Internal,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::PermissionDenied => "permission-denied",
            StoreErrorKind::NotFound => "not-found",
            StoreErrorKind::InvalidArgument => "invalid-argument",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::DeadlineExceeded => "deadline-exceeded",
            StoreErrorKind::ResourceExhausted => "resource-exhausted",
            StoreErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// An error reported by a document store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::PermissionDenied, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Internal, message)
    }

    /// Permission failures are the only class a lenient restore may skip
    pub fn is_permission_denied(&self) -> bool {
        self.kind == StoreErrorKind::PermissionDenied
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => StoreErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => StoreErrorKind::NotFound,
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                StoreErrorKind::InvalidArgument
            }
            std::io::ErrorKind::TimedOut => StoreErrorKind::DeadlineExceeded,
            _ => StoreErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A document database exposing named collections
pub trait DocumentStore {
    /// The store's native timestamp type
    type Timestamp: TimestampLike + FromDateTime + Clone + fmt::Debug + PartialEq;

    /// List every document of a collection. A collection that does not exist
    /// is empty.
    fn list_documents(&self, collection: &str) -> StoreResult<Vec<StoredDocument<Self::Timestamp>>>;

    /// List the ids of every document of a collection
    fn list_ids(&self, collection: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .list_documents(collection)?
            .into_iter()
            .map(|doc| doc.id)
            .collect())
    }

    /// Create or replace every document in `batch` as one atomic commit
    fn set_documents(
        &self,
        collection: &str,
        batch: &[StoredDocument<Self::Timestamp>],
    ) -> StoreResult<()>;

    /// Delete every id in `ids` as one atomic commit. Unknown ids are ignored.
    fn delete_documents(&self, collection: &str, ids: &[String]) -> StoreResult<()>;

    /// Largest batch accepted by `set_documents` and `delete_documents`
    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::permission_denied("rules reject write");
        assert_eq!(err.to_string(), "permission-denied: rules reject write");
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_io_error_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(StoreError::from(io).is_permission_denied());

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(StoreError::from(io).kind, StoreErrorKind::DeadlineExceeded);
    }
}
