//! Configuration module for obra-backup
//!
//! - Path resolution for the data, archive and audit files
//! - Persisted settings
//! - The ordered collection set and its restore order

pub mod collections;
pub mod paths;
pub mod settings;

pub use collections::{restore_order, DEFAULT_COLLECTIONS, IDENTITY_COLLECTION};
pub use paths::BackupPaths;
pub use settings::{ArchiveRetention, RestoreDefaults, Settings};
