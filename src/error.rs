//! Custom error types for obra-backup
//!
//! This module defines the error hierarchy for backup and restore operations
//! using thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::backup::VerificationReport;
use crate::codec::CodecError;
use crate::storage::StoreError;

/// The main error type for backup, restore and archive operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// The backup payload does not have the expected shape
    #[error("Invalid backup: {0}")]
    Validation(String),

    /// One or more collections could not be read while building a backup
    #[error("Backup incomplete, could not read collections: {}", .collections.join(", "))]
    PartialBackup { collections: Vec<String> },

    /// A strict restore hit an irregularity it is not allowed to skip
    #[error("{}", strict_message(.collection.as_deref(), .reason))]
    StrictRestore {
        collection: Option<String>,
        reason: String,
    },

    /// The post-restore re-read did not match the restored payload
    #[error("Verification failed for collection '{collection}': {report}")]
    Verification {
        collection: String,
        report: VerificationReport,
    },

    /// A document store failure, tagged with the collection it happened in
    #[error("Collection '{collection}': {source}")]
    Provider {
        collection: String,
        #[source]
        source: StoreError,
    },

    /// A value could not be decoded back into its native form
    #[error("Collection '{collection}', document '{document}': {source}")]
    Codec {
        collection: String,
        document: String,
        #[source]
        source: CodecError,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Archive storage errors
    #[error("Archive error: {0}")]
    Archive(String),
}

fn strict_message(collection: Option<&str>, reason: &str) -> String {
    match collection {
        Some(name) => format!("Strict restore aborted at collection '{}': {}", name, reason),
        None => format!("Strict restore aborted: {}", reason),
    }
}

impl BackupError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a strict-restore error tied to a collection
    pub fn strict(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StrictRestore {
            collection: Some(collection.into()),
            reason: reason.into(),
        }
    }

    /// Wrap a store failure with the collection it happened in
    pub fn provider(collection: impl Into<String>, source: StoreError) -> Self {
        Self::Provider {
            collection: collection.into(),
            source,
        }
    }

    /// Create a "not found" error for archived backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// The collection this error is attributed to, if any
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::StrictRestore { collection, .. } => collection.as_deref(),
            Self::Verification { collection, .. }
            | Self::Provider { collection, .. }
            | Self::Codec { collection, .. } => Some(collection),
            _ => None,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a store permission failure
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Provider { source, .. } if source.is_permission_denied())
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for obra-backup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreErrorKind;

    #[test]
    fn test_partial_backup_names_every_collection() {
        let err = BackupError::PartialBackup {
            collections: vec!["nominas".into(), "facturas".into()],
        };
        assert_eq!(
            err.to_string(),
            "Backup incomplete, could not read collections: nominas, facturas"
        );
    }

    #[test]
    fn test_strict_error_display() {
        let err = BackupError::strict("obras", "collection missing from backup");
        assert_eq!(
            err.to_string(),
            "Strict restore aborted at collection 'obras': collection missing from backup"
        );
        assert_eq!(err.collection(), Some("obras"));

        let err = BackupError::StrictRestore {
            collection: None,
            reason: "backup is partial".into(),
        };
        assert_eq!(err.to_string(), "Strict restore aborted: backup is partial");
    }

    #[test]
    fn test_provider_error_carries_collection() {
        let err = BackupError::provider(
            "users",
            StoreError::new(StoreErrorKind::PermissionDenied, "missing grant"),
        );
        assert!(err.to_string().starts_with("Collection 'users':"));
        assert!(err.is_permission_denied());
        assert_eq!(err.collection(), Some("users"));
    }

    #[test]
    fn test_not_found_error() {
        let err = BackupError::backup_not_found("abc");
        assert_eq!(err.to_string(), "Backup not found: abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BackupError = io_err.into();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
