//! Backup builder
//!
//! Reads every configured collection in order and assembles a
//! [`BackupPayload`]. A collection that cannot be read is recorded as
//! skipped with no documents; whether that is acceptable is decided once
//! all collections have been attempted.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::progress::{Phase, Progress, ProgressReporter};
use super::types::{BackupPayload, BackupStats, DocumentEntry, BACKUP_SOURCE, BACKUP_VERSION};
use crate::codec::{format_iso, serialize_value};
use crate::config::Settings;
use crate::error::{BackupError, BackupResult};
use crate::storage::DocumentStore;

/// Options for a backup run
#[derive(Default)]
pub struct BackupOptions<'a> {
    /// Return a payload even when some collections could not be read
    pub allow_partial: bool,
    pub on_progress: Option<&'a mut dyn ProgressReporter>,
}

impl<'a> BackupOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    pub fn on_progress(mut self, reporter: &'a mut dyn ProgressReporter) -> Self {
        self.on_progress = Some(reporter);
        self
    }
}

/// Builds backup payloads from a document store
pub struct BackupBuilder<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    collections: Vec<String>,
}

impl<'s, S: DocumentStore + ?Sized> BackupBuilder<'s, S> {
    /// Create a builder covering the collections listed in `settings`
    pub fn new(store: &'s S, settings: &Settings) -> Self {
        Self::with_collections(store, settings.collections.clone())
    }

    /// Create a builder covering an explicit, ordered collection list
    pub fn with_collections(store: &'s S, collections: Vec<String>) -> Self {
        Self { store, collections }
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Snapshot every configured collection
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::PartialBackup`] naming every unreadable
    /// collection unless `allow_partial` is set.
    pub fn create_database_backup(&self, options: BackupOptions<'_>) -> BackupResult<BackupPayload> {
        let BackupOptions {
            allow_partial,
            on_progress,
        } = options;
        let mut progress = Progress::new(on_progress);

        let mut collections = BTreeMap::new();
        let mut counts = BTreeMap::new();
        let mut skipped = Vec::new();
        let mut total_documents = 0;

        for name in &self.collections {
            let documents = match self.store.list_documents(name) {
                Ok(documents) => documents,
                Err(e) => {
                    warn!(collection = %name, error = %e, "Collection unreadable, skipping");
                    skipped.push(name.clone());
                    collections.insert(name.clone(), Vec::new());
                    counts.insert(name.clone(), 0);
                    continue;
                }
            };

            let total = documents.len();
            let mut entries = Vec::with_capacity(total);
            for (index, doc) in documents.into_iter().enumerate() {
                entries.push(DocumentEntry {
                    data: serialize_value(&doc.data),
                    id: doc.id,
                });
                progress.emit(Phase::Reading, name, index + 1, total);
            }

            debug!(collection = %name, documents = total, "Collection captured");
            total_documents += total;
            counts.insert(name.clone(), total);
            collections.insert(name.clone(), entries);
        }

        if !skipped.is_empty() && !allow_partial {
            return Err(BackupError::PartialBackup {
                collections: skipped,
            });
        }

        info!(
            collections = self.collections.len(),
            documents = total_documents,
            skipped = skipped.len(),
            "Backup built"
        );

        Ok(BackupPayload {
            version: BACKUP_VERSION,
            created_at: format_iso(&Utc::now()),
            source: BACKUP_SOURCE.to_string(),
            collections,
            stats: BackupStats {
                collections: self.collections.len(),
                documents: total_documents,
                skipped_collections: skipped,
                collection_document_counts: Some(counts),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::ProgressEvent;
    use crate::storage::{MemoryStore, StoreOperation, StoreValue, Timestamp};
    use chrono::TimeZone;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("users", "u1", json!({"name": "Ana"})).unwrap();
        store.insert("users", "u2", json!({"name": "Bob"})).unwrap();
        store.insert("obras", "o1", json!({"nombre": "Torre A"})).unwrap();
        store
    }

    #[test]
    fn test_backup_captures_every_collection() {
        let store = seeded_store();
        let builder = BackupBuilder::with_collections(&store, names(&["users", "obras", "pagos"]));

        let payload = builder.create_database_backup(BackupOptions::new()).unwrap();

        assert_eq!(payload.version, BACKUP_VERSION);
        assert_eq!(payload.source, "obra-backup");
        assert_eq!(payload.collections.len(), 3);
        assert_eq!(payload.collections["users"].len(), 2);
        assert!(payload.collections["pagos"].is_empty());
        assert_eq!(payload.stats.collections, 3);
        assert_eq!(payload.stats.documents, 3);
        assert!(payload.stats.skipped_collections.is_empty());

        let counts = payload.stats.collection_document_counts.unwrap();
        assert_eq!(counts["users"], 2);
        assert_eq!(counts["obras"], 1);
        assert_eq!(counts["pagos"], 0);
    }

    #[test]
    fn test_backup_serializes_timestamps() {
        let store = MemoryStore::new();
        let ts = Timestamp::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap().timestamp(),
            0,
        )
        .unwrap();
        store
            .insert(
                "facturas",
                "f1",
                StoreValue::object([("emitida", StoreValue::Timestamp(ts))]),
            )
            .unwrap();

        let payload = BackupBuilder::with_collections(&store, names(&["facturas"]))
            .create_database_backup(BackupOptions::new())
            .unwrap();

        assert_eq!(
            payload.collections["facturas"][0].data,
            json!({"emitida": {"__backupType": "timestamp", "value": "2024-01-15T09:30:00.000Z"}})
        );
    }

    #[test]
    fn test_progress_reported_per_document() {
        let store = seeded_store();
        let mut events: Vec<ProgressEvent> = Vec::new();

        BackupBuilder::with_collections(&store, names(&["users", "obras"]))
            .create_database_backup(BackupOptions::new().on_progress(&mut events))
            .unwrap();

        let users: Vec<_> = events
            .iter()
            .filter(|e| e.collection == "users")
            .map(|e| (e.phase, e.current, e.total))
            .collect();
        assert_eq!(users, vec![(Phase::Reading, 1, 2), (Phase::Reading, 2, 2)]);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_unreadable_collection_fails_without_allow_partial() {
        let store = seeded_store();
        store.deny("obras", StoreOperation::List);
        store.deny("pagos", StoreOperation::List);

        let err = BackupBuilder::with_collections(&store, names(&["users", "obras", "pagos"]))
            .create_database_backup(BackupOptions::new())
            .unwrap_err();

        match err {
            BackupError::PartialBackup { collections } => {
                assert_eq!(collections, vec!["obras", "pagos"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_allow_partial_records_skipped_collections() {
        let store = seeded_store();
        store.deny("obras", StoreOperation::List);

        let payload = BackupBuilder::with_collections(&store, names(&["users", "obras"]))
            .create_database_backup(BackupOptions::new().allow_partial(true))
            .unwrap();

        assert_eq!(payload.stats.skipped_collections, vec!["obras"]);
        assert!(payload.collections["obras"].is_empty());
        assert_eq!(payload.stats.documents, 2);
        assert!(payload.is_partial());
    }
}
