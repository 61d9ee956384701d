//! Audit trail of backup operations
//!
//! Every command that changes the store or the archive appends one
//! [`AuditEntry`] to a line-delimited JSON log through [`AuditLogger`].
//!
//! # Example
//!
//! ```rust,ignore
//! use obra_backup::audit::{AuditEntry, AuditLogger, Operation};
//!
//! let logger = AuditLogger::new(paths.audit_log());
//! logger.log(&AuditEntry::for_backup(Operation::Backup, &metadata, "40 documents"))?;
//! ```

mod entry;
mod logger;

pub use entry::{AuditEntry, Operation};
pub use logger::AuditLogger;
