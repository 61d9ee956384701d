//! Backup and restore for the document store
//!
//! # Architecture
//!
//! - [`BackupBuilder`] reads every configured collection into a portable
//!   [`BackupPayload`]
//! - [`RestoreEngine`] replays a payload into a store in batches, with
//!   optional replace, strict and verify modes
//! - [`BackupArchive`] keeps the newest saved backups in an [`ArchiveStore`]
//! - `export` reads and writes payload files
//!
//! # Backup Format
//!
//! A payload is camelCase JSON:
//! - `version`: format version, currently 1
//! - `createdAt`: ISO-8601 creation time
//! - `source`: producer tag
//! - `collections`: collection name to `[{id, data}]`, dates wrapped as
//!   `{"__backupType": "timestamp" | "date", "value": <ISO>}`
//! - `stats`: counts plus the collections that could not be read
//!
//! # Example
//!
//! ```rust,ignore
//! use obra_backup::backup::{BackupBuilder, BackupOptions, RestoreEngine, RestoreOptions};
//! use obra_backup::config::Settings;
//! use obra_backup::storage::MemoryStore;
//!
//! let settings = Settings::default();
//! let store = MemoryStore::new();
//!
//! let payload = BackupBuilder::new(&store, &settings)
//!     .create_database_backup(BackupOptions::new())?;
//!
//! let result = RestoreEngine::new(&store, &settings)
//!     .restore_database_backup(&payload, RestoreOptions::new())?;
//! println!("{}", result.summary());
//! ```

mod archive;
mod builder;
mod events;
mod export;
mod progress;
mod restore;
mod types;
mod verify;

pub use archive::{
    display_name, ArchiveStore, BackupArchive, BackupMetadata, FileArchiveStore,
    MemoryArchiveStore, StoredBackup,
};
pub use builder::{BackupBuilder, BackupOptions};
pub use events::{CacheEvent, EventBus};
pub use export::{backup_filename, export_backup, inspect_backup, read_backup_file, BackupSummary};
pub use progress::{Phase, ProgressEvent, ProgressReporter};
pub use restore::{RestoreEngine, RestoreOptions};
pub use types::{
    validate_backup_value, BackupPayload, BackupStats, DocumentEntry, RestoreResult,
    BACKUP_SOURCE, BACKUP_VERSION,
};
pub use verify::{diff_documents, VerificationReport};
