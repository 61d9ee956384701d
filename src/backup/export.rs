//! Backup files on disk
//!
//! Exported backups are plain payload JSON named after their creation time,
//! so a directory of exports sorts chronologically.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::BackupPayload;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::write_json_atomic;

/// Conventional file name: `backup-<createdAt>.json` with every character
/// outside `[A-Za-z0-9-]` replaced by `-`
pub fn backup_filename(created_at: &str) -> String {
    let stamp: String = created_at
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("backup-{}.json", stamp)
}

/// Write `payload` into `dir` under its conventional name
pub fn export_backup(payload: &BackupPayload, dir: &Path) -> BackupResult<PathBuf> {
    let path = dir.join(backup_filename(&payload.created_at));
    write_json_atomic(&path, payload, true)
        .map_err(|e| BackupError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(path)
}

/// Read and validate a payload file
pub fn read_backup_file(path: &Path) -> BackupResult<BackupPayload> {
    let contents = fs::read_to_string(path)
        .map_err(|e| BackupError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    BackupPayload::from_json(&contents)
}

/// What a backup contains relative to a configured collection set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSummary {
    pub version: u32,
    pub created_at: String,
    pub source: String,
    /// Document count per collection present in the backup
    pub collections: BTreeMap<String, usize>,
    pub documents: usize,
    /// Collections that could not be read when the backup was built
    pub skipped: Vec<String>,
    /// Configured collections the backup does not contain
    pub missing: Vec<String>,
}

impl BackupSummary {
    /// Whether a strict restore would accept this backup
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.missing.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_complete() {
            return format!("Complete backup (v{})", self.version);
        }

        let mut gaps = Vec::new();
        if !self.skipped.is_empty() {
            gaps.push(format!("skipped {}", self.skipped.join(", ")));
        }
        if !self.missing.is_empty() {
            gaps.push(format!("missing {}", self.missing.join(", ")));
        }
        format!("Partial backup (v{}): {}", self.version, gaps.join("; "))
    }
}

/// Summarise `payload` against the configured collections
pub fn inspect_backup(payload: &BackupPayload, configured: &[String]) -> BackupSummary {
    BackupSummary {
        version: payload.version,
        created_at: payload.created_at.clone(),
        source: payload.source.clone(),
        collections: payload
            .collections
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect(),
        documents: payload.document_count(),
        skipped: payload.stats.skipped_collections.clone(),
        missing: configured
            .iter()
            .filter(|name| !payload.collections.contains_key(*name))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> BackupPayload {
        BackupPayload::from_value(json!({
            "version": 1,
            "createdAt": "2024-03-01T12:05:09.120Z",
            "source": "obra-backup",
            "collections": {
                "users": [{"id": "u1", "data": {"name": "Ana"}}],
                "obras": []
            },
            "stats": {"collections": 2, "documents": 1}
        }))
        .unwrap()
    }

    #[test]
    fn test_backup_filename() {
        assert_eq!(
            backup_filename("2024-03-01T12:05:09.120Z"),
            "backup-2024-03-01T12-05-09-120Z.json"
        );
    }

    #[test]
    fn test_backup_filename_never_leaves_the_directory() {
        assert_eq!(backup_filename("../x/y\\z .."), "backup----x-y-z---.json");

        let temp = TempDir::new().unwrap();
        let mut payload = sample();
        payload.created_at = "2024/03/01 ../../escape".to_string();

        let path = export_backup(&payload, temp.path()).unwrap();
        assert_eq!(path.parent(), Some(temp.path()));
        assert_eq!(
            std::fs::read_dir(temp.path()).unwrap().count(),
            1,
            "no subdirectories are created"
        );
    }

    #[test]
    fn test_export_then_read() {
        let temp = TempDir::new().unwrap();
        let payload = sample();

        let path = export_backup(&payload, temp.path()).unwrap();
        assert!(path.ends_with("backup-2024-03-01T12-05-09-120Z.json"));
        assert_eq!(read_backup_file(&path).unwrap(), payload);
    }

    #[test]
    fn test_read_rejects_invalid_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, r#"{"version": "one", "createdAt": "x", "collections": {}}"#).unwrap();

        assert!(read_backup_file(&path).unwrap_err().is_validation());
        assert!(matches!(
            read_backup_file(&temp.path().join("absent.json")),
            Err(BackupError::Io(_))
        ));
    }

    #[test]
    fn test_inspect_complete_and_partial() {
        let payload = sample();
        let configured = vec!["users".to_string(), "obras".to_string()];

        let summary = inspect_backup(&payload, &configured);
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.collections["users"], 1);
        assert_eq!(summary.summary(), "Complete backup (v1)");

        let mut partial = payload.clone();
        partial.stats.skipped_collections = vec!["obras".to_string()];
        let mut wider = configured.clone();
        wider.push("pagos".to_string());

        let summary = inspect_backup(&partial, &wider);
        assert!(!summary.is_complete());
        assert_eq!(
            summary.summary(),
            "Partial backup (v1): skipped obras; missing pagos"
        );
    }
}
