//! Audit entry data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backup::BackupMetadata;

/// Operations recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A backup was built
    Backup,
    /// A backup was restored into the store
    Restore,
    /// An archived backup was deleted on request
    Delete,
    /// An archived backup was removed by the retention cap
    Evict,
    /// A backup was written to a file
    Export,
    /// A backup file was added to the archive
    Import,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Backup => write!(f, "BACKUP"),
            Operation::Restore => write!(f, "RESTORE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Evict => write!(f, "EVICT"),
            Operation::Export => write!(f, "EXPORT"),
            Operation::Import => write!(f, "IMPORT"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    pub operation: Operation,

    /// Archive id of the backup involved, if it was archived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,

    /// Display name of the backup involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,

    /// Human-readable outcome
    pub summary: String,
}

impl AuditEntry {
    pub fn new(operation: Operation, summary: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            backup_id: None,
            backup_name: None,
            summary: summary.into(),
        }
    }

    /// Entry about an archived backup
    pub fn for_backup(
        operation: Operation,
        metadata: &BackupMetadata,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            backup_id: Some(metadata.id.clone()),
            backup_name: Some(metadata.name.clone()),
            ..Self::new(operation, summary)
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation
        );

        if let Some(id) = &self.backup_id {
            output.push_str(&format!(" {}", id));
        }
        if let Some(name) = &self.backup_name {
            output.push_str(&format!(" ({})", name));
        }

        output.push_str(&format!(": {}", self.summary));
        output
    }
}
