//! obra-backup - backup and restore for a collection-based document store
//!
//! Snapshots every configured collection of a document store into a
//! portable JSON payload, archives the newest payloads, and restores them
//! in batches with optional replace, strict and verify modes.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and the collection list
//! - `error`: Custom error types
//! - `storage`: The `DocumentStore` trait, store values and backends
//! - `codec`: Portable encoding of store values and canonical JSON text
//! - `backup`: Backup builder, restore engine, archive and backup files
//! - `audit`: Audit log of backup operations
//! - `cli`: Command handlers for the `obra-backup` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use obra_backup::config::{BackupPaths, Settings};
//!
//! let paths = BackupPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod storage;

pub use error::{BackupError, BackupResult};
