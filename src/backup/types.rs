//! Backup payload and result types
//!
//! Field names follow the portable file format, which is camelCase JSON.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tracing::warn;

use crate::codec::parse_iso;
use crate::error::{BackupError, BackupResult};

/// Current payload format version
pub const BACKUP_VERSION: u32 = 1;

/// Value of the payload's `source` field
pub const BACKUP_SOURCE: &str = "obra-backup";

/// One backed-up document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: String,
    /// Portable content tree, wrappers in place of dates
    pub data: Value,
}

/// Statistics recorded when a backup is built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    /// Number of configured collections
    pub collections: usize,
    /// Documents captured across all collections
    pub documents: usize,
    #[serde(default)]
    pub skipped_collections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_document_counts: Option<BTreeMap<String, usize>>,
}

/// A complete, portable snapshot of the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    pub version: u32,
    /// ISO-8601 creation time
    pub created_at: String,
    #[serde(default)]
    pub source: String,
    pub collections: BTreeMap<String, Vec<DocumentEntry>>,
    #[serde(default)]
    pub stats: BackupStats,
}

impl BackupPayload {
    /// Validate a raw JSON value and decode it into a payload
    pub fn from_value(value: Value) -> BackupResult<Self> {
        validate_backup_value(&value)?;
        let payload: BackupPayload = serde_json::from_value(value)
            .map_err(|e| BackupError::validation(format!("malformed backup: {}", e)))?;
        payload.validate()?;
        Ok(payload)
    }

    /// Parse and validate a payload from JSON text
    pub fn from_json(text: &str) -> BackupResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BackupError::validation(format!("not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Checks the shape can't express: every entry has a non-empty id.
    ///
    /// A repeated id is only warned about; restore upserts in order, so the
    /// last entry wins.
    pub fn validate(&self) -> BackupResult<()> {
        for (name, entries) in &self.collections {
            let mut seen = HashSet::with_capacity(entries.len());
            for (index, entry) in entries.iter().enumerate() {
                if entry.id.is_empty() {
                    return Err(BackupError::validation(format!(
                        "collection '{}' entry {} has an empty id",
                        name, index
                    )));
                }
                if !seen.insert(entry.id.as_str()) {
                    warn!(collection = %name, id = %entry.id, "Duplicate document id, last entry wins");
                }
            }
        }
        Ok(())
    }

    /// Ids that appear more than once in a collection, in first-repeat order
    pub fn duplicate_ids(&self, collection: &str) -> Vec<&str> {
        let Some(entries) = self.collections.get(collection) else {
            return Vec::new();
        };
        let mut seen = HashSet::with_capacity(entries.len());
        let mut repeated = Vec::new();
        for entry in entries {
            if !seen.insert(entry.id.as_str()) && !repeated.contains(&entry.id.as_str()) {
                repeated.push(entry.id.as_str());
            }
        }
        repeated
    }

    /// Creation time as an instant, if `created_at` parses
    pub fn created_at_datetime(&self) -> Option<DateTime<Utc>> {
        parse_iso(&self.created_at)
    }

    /// Total number of document entries
    pub fn document_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// Whether the backup was built with unreadable collections
    pub fn is_partial(&self) -> bool {
        !self.stats.skipped_collections.is_empty()
    }
}

/// Check that a raw value has the payload shape: numeric `version`, string
/// `createdAt`, and `collections` mapping names to arrays of `{id, data}`
pub fn validate_backup_value(value: &Value) -> BackupResult<()> {
    let obj = value
        .as_object()
        .ok_or_else(|| BackupError::validation("backup must be a JSON object"))?;

    if !obj.get("version").is_some_and(Value::is_number) {
        return Err(BackupError::validation("'version' must be a number"));
    }
    if !obj.get("createdAt").is_some_and(Value::is_string) {
        return Err(BackupError::validation("'createdAt' must be a string"));
    }

    let collections = obj
        .get("collections")
        .and_then(Value::as_object)
        .ok_or_else(|| BackupError::validation("'collections' must be an object"))?;

    for (name, entries) in collections {
        let entries = entries.as_array().ok_or_else(|| {
            BackupError::validation(format!("collection '{}' must be an array", name))
        })?;
        for (index, entry) in entries.iter().enumerate() {
            let entry = entry.as_object().ok_or_else(|| {
                BackupError::validation(format!(
                    "collection '{}' entry {} must be an object",
                    name, index
                ))
            })?;
            if !entry.get("id").is_some_and(Value::is_string) {
                return Err(BackupError::validation(format!(
                    "collection '{}' entry {} needs a string 'id'",
                    name, index
                )));
            }
            if !entry.contains_key("data") {
                return Err(BackupError::validation(format!(
                    "collection '{}' entry {} has no 'data'",
                    name, index
                )));
            }
        }
    }
    Ok(())
}

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    /// Size of the configured collection set
    pub collections_processed: usize,
    pub documents_written: usize,
    pub documents_deleted: usize,
    /// Collections left untouched by a lenient restore
    pub collections_skipped: Vec<String>,
}

impl RestoreResult {
    pub fn is_complete(&self) -> bool {
        self.collections_skipped.is_empty()
    }

    /// One-line summary of what was restored
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Restored {} collection(s): {} document(s) written, {} deleted",
            self.collections_processed.saturating_sub(self.collections_skipped.len()),
            self.documents_written,
            self.documents_deleted
        );
        if !self.collections_skipped.is_empty() {
            text.push_str(&format!(
                "; skipped {}",
                self.collections_skipped.join(", ")
            ));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "version": 1,
            "createdAt": "2024-03-01T12:00:00.000Z",
            "source": "obra-backup",
            "collections": {
                "users": [{"id": "u1", "data": {"name": "Ana"}}],
                "obras": []
            },
            "stats": {"collections": 2, "documents": 1, "skippedCollections": []}
        })
    }

    #[test]
    fn test_from_value_accepts_valid_payload() {
        let payload = BackupPayload::from_value(sample()).unwrap();
        assert_eq!(payload.version, 1);
        assert_eq!(payload.document_count(), 1);
        assert!(!payload.is_partial());
        assert!(payload.created_at_datetime().is_some());
        assert!(payload.stats.collection_document_counts.is_none());
    }

    #[test]
    fn test_stats_are_optional() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("stats");
        let payload = BackupPayload::from_value(value).unwrap();
        assert_eq!(payload.stats, BackupStats::default());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let cases = [
            json!([]),
            json!({"version": "1", "createdAt": "x", "collections": {}}),
            json!({"version": 1, "createdAt": 5, "collections": {}}),
            json!({"version": 1, "createdAt": "x", "collections": []}),
            json!({"version": 1, "createdAt": "x", "collections": {"users": {}}}),
            json!({"version": 1, "createdAt": "x", "collections": {"users": [{"data": {}}]}}),
            json!({"version": 1, "createdAt": "x", "collections": {"users": [{"id": "u1"}]}}),
        ];
        for case in cases {
            let err = BackupPayload::from_value(case).unwrap_err();
            assert!(err.is_validation(), "unexpected error: {}", err);
        }
    }

    #[test]
    fn test_accepts_duplicate_ids() {
        let value = json!({
            "version": 1,
            "createdAt": "2024-03-01T12:00:00.000Z",
            "collections": {"users": [
                {"id": "u1", "data": {}},
                {"id": "u2", "data": {}},
                {"id": "u1", "data": {}},
                {"id": "u1", "data": {}}
            ]}
        });
        let payload = BackupPayload::from_value(value).unwrap();
        assert_eq!(payload.duplicate_ids("users"), vec!["u1"]);
        assert!(payload.duplicate_ids("obras").is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let payload = BackupPayload::from_value(sample()).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value["stats"].get("skippedCollections").is_some());
    }

    #[test]
    fn test_restore_result_summary() {
        let result = RestoreResult {
            collections_processed: 3,
            documents_written: 10,
            documents_deleted: 2,
            collections_skipped: vec!["nominas".into()],
        };
        assert!(!result.is_complete());
        assert_eq!(
            result.summary(),
            "Restored 2 collection(s): 10 document(s) written, 2 deleted; skipped nominas"
        );
    }
}
