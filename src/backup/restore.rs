//! Restore engine
//!
//! Replays a [`BackupPayload`] into a document store one collection at a
//! time, in [`restore_order`]: upsert in batches, optionally delete
//! documents the backup does not contain, optionally re-read and compare.
//!
//! Failure policy:
//!
//! - strict restores abort on a partial backup, a collection missing from
//!   the payload, or a permission failure while reading, deleting or
//!   verifying;
//! - lenient restores record those collections as skipped and carry on;
//! - every other failure aborts the restore, leaving collections not yet
//!   visited untouched.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::events::{CacheEvent, EventBus};
use super::progress::{Phase, Progress, ProgressReporter};
use super::types::{BackupPayload, DocumentEntry, RestoreResult};
use super::verify::diff_documents;
use crate::codec::{deserialize_value, serialize_value, stable_stringify, try_deserialize_value};
use crate::config::{restore_order, RestoreDefaults, Settings};
use crate::error::{BackupError, BackupResult};
use crate::storage::{DocumentStore, StoredDocument, DEFAULT_BATCH_SIZE};

/// Options for a restore run
pub struct RestoreOptions<'a> {
    /// Delete live documents that are not in the backup
    pub replace_existing: bool,
    /// Abort instead of skipping irregular collections
    pub strict: bool,
    /// Re-read every collection and compare with the backup
    pub verify_after_restore: bool,
    pub on_progress: Option<&'a mut dyn ProgressReporter>,
}

impl Default for RestoreOptions<'_> {
    fn default() -> Self {
        Self {
            replace_existing: true,
            strict: true,
            verify_after_restore: true,
            on_progress: None,
        }
    }
}

impl<'a> RestoreOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options taken from the configured restore defaults
    pub fn from_defaults(defaults: &RestoreDefaults) -> Self {
        Self {
            replace_existing: defaults.replace_existing,
            strict: defaults.strict,
            verify_after_restore: defaults.verify_after_restore,
            on_progress: None,
        }
    }

    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn verify_after_restore(mut self, verify: bool) -> Self {
        self.verify_after_restore = verify;
        self
    }

    pub fn on_progress(mut self, reporter: &'a mut dyn ProgressReporter) -> Self {
        self.on_progress = Some(reporter);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Policy {
    replace_existing: bool,
    strict: bool,
    verify: bool,
}

/// Restores backup payloads into a document store
pub struct RestoreEngine<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    collections: Vec<String>,
    identity_collection: String,
    batch_size: usize,
    reject_invalid_dates: bool,
    events: Option<Arc<EventBus>>,
}

impl<'s, S: DocumentStore + ?Sized> RestoreEngine<'s, S> {
    /// Create an engine for the collections, batch size and date policy in
    /// `settings`
    pub fn new(store: &'s S, settings: &Settings) -> Self {
        Self {
            store,
            collections: settings.collections.clone(),
            identity_collection: settings.identity_collection.clone(),
            batch_size: settings.batch_size,
            reject_invalid_dates: settings.restore.reject_invalid_dates,
            events: None,
        }
    }

    /// Create an engine for an explicit collection list
    pub fn with_collections(
        store: &'s S,
        collections: Vec<String>,
        identity_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            collections,
            identity_collection: identity_collection.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            reject_invalid_dates: false,
            events: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fail a collection on an unparsable date instead of writing `null`
    pub fn reject_invalid_dates(mut self, reject: bool) -> Self {
        self.reject_invalid_dates = reject;
        self
    }

    /// Publish cache invalidation on this bus after a successful restore
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Order in which collections are visited
    pub fn restore_order(&self) -> Vec<String> {
        restore_order(&self.collections, &self.identity_collection)
    }

    fn chunk_size(&self) -> usize {
        self.batch_size.min(self.store.max_batch_size()).max(1)
    }

    /// Validate a raw JSON payload and restore it
    pub fn restore_value(
        &self,
        raw: Value,
        options: RestoreOptions<'_>,
    ) -> BackupResult<RestoreResult> {
        let backup = BackupPayload::from_value(raw)?;
        self.restore_database_backup(&backup, options)
    }

    /// Restore `backup` into the store
    ///
    /// # Errors
    ///
    /// Fails before any write on an invalid payload, or in strict mode on a
    /// partial backup or a configured collection missing from it. Later
    /// failures carry the name of the collection being restored.
    pub fn restore_database_backup(
        &self,
        backup: &BackupPayload,
        options: RestoreOptions<'_>,
    ) -> BackupResult<RestoreResult> {
        backup.validate()?;

        let RestoreOptions {
            replace_existing,
            strict,
            verify_after_restore,
            on_progress,
        } = options;
        let policy = Policy {
            replace_existing,
            strict,
            verify: verify_after_restore,
        };
        let mut progress = Progress::new(on_progress);

        if strict {
            self.check_strict_preconditions(backup)?;
        }

        let skipped_at_backup: HashSet<&str> = backup
            .stats
            .skipped_collections
            .iter()
            .map(String::as_str)
            .collect();

        let mut result = RestoreResult {
            collections_processed: self.collections.len(),
            ..RestoreResult::default()
        };

        for name in self.restore_order() {
            let Some(entries) = backup.collections.get(&name) else {
                skip_collection(&name, "missing from backup", policy.strict, &mut result)?;
                continue;
            };
            if skipped_at_backup.contains(name.as_str()) {
                skip_collection(
                    &name,
                    "was skipped when the backup was created",
                    policy.strict,
                    &mut result,
                )?;
                continue;
            }

            self.restore_collection(&name, entries, policy, &mut progress, &mut result)?;
        }

        if let Some(events) = &self.events {
            let delivered = events.publish(&CacheEvent::InvalidateAll);
            debug!(subscribers = delivered, "Cache invalidation published");
        }

        info!(
            written = result.documents_written,
            deleted = result.documents_deleted,
            skipped = result.collections_skipped.len(),
            "Restore complete"
        );
        Ok(result)
    }

    fn check_strict_preconditions(&self, backup: &BackupPayload) -> BackupResult<()> {
        if backup.is_partial() {
            return Err(BackupError::StrictRestore {
                collection: None,
                reason: format!(
                    "backup is partial, collections skipped when it was created: {}",
                    backup.stats.skipped_collections.join(", ")
                ),
            });
        }

        let missing: Vec<&String> = self
            .collections
            .iter()
            .filter(|name| !backup.collections.contains_key(*name))
            .collect();
        match missing.as_slice() {
            [] => Ok(()),
            [name] => Err(BackupError::strict(name.as_str(), "missing from backup")),
            names => Err(BackupError::StrictRestore {
                collection: None,
                reason: format!(
                    "collections missing from backup: {}",
                    names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
                ),
            }),
        }
    }

    fn restore_collection(
        &self,
        name: &str,
        entries: &[DocumentEntry],
        policy: Policy,
        progress: &mut Progress<'_>,
        result: &mut RestoreResult,
    ) -> BackupResult<()> {
        let documents = self.decode_entries(name, entries)?;

        let written = self.write_documents(name, &documents, progress)?;
        result.documents_written += written;

        let mut deleted = 0;
        if policy.replace_existing {
            match self.delete_stale(name, &documents, progress) {
                Ok(count) => deleted = count,
                Err(err) => {
                    return skip_on_permission(
                        name,
                        "deleting stale documents",
                        err,
                        policy.strict,
                        result,
                    );
                }
            }
            result.documents_deleted += deleted;
        }

        if policy.verify {
            if let Err(err) = self.verify_collection(name, &documents, policy.replace_existing) {
                return skip_on_permission(name, "verifying", err, policy.strict, result);
            }
        }

        info!(collection = %name, written, deleted, "Collection restored");
        Ok(())
    }

    fn decode_entries(
        &self,
        name: &str,
        entries: &[DocumentEntry],
    ) -> BackupResult<Vec<StoredDocument<S::Timestamp>>> {
        let mut documents = Vec::with_capacity(entries.len());
        for entry in entries {
            let data = if self.reject_invalid_dates {
                try_deserialize_value(&entry.data).map_err(|source| BackupError::Codec {
                    collection: name.to_string(),
                    document: entry.id.clone(),
                    source,
                })?
            } else {
                deserialize_value(&entry.data)
            };
            documents.push(StoredDocument {
                id: entry.id.clone(),
                data,
            });
        }
        Ok(documents)
    }

    fn write_documents(
        &self,
        name: &str,
        documents: &[StoredDocument<S::Timestamp>],
        progress: &mut Progress<'_>,
    ) -> BackupResult<usize> {
        let total = documents.len();
        let mut written = 0;

        for chunk in documents.chunks(self.chunk_size()) {
            self.store
                .set_documents(name, chunk)
                .map_err(|e| BackupError::provider(name, e))?;
            written += chunk.len();
            progress.emit(Phase::Writing, name, written, total);
        }

        Ok(written)
    }

    fn delete_stale(
        &self,
        name: &str,
        documents: &[StoredDocument<S::Timestamp>],
        progress: &mut Progress<'_>,
    ) -> BackupResult<usize> {
        let incoming: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();

        let mut stale: Vec<String> = self
            .store
            .list_ids(name)
            .map_err(|e| BackupError::provider(name, e))?
            .into_iter()
            .filter(|id| !incoming.contains(id.as_str()))
            .collect();
        stale.sort();

        let total = stale.len();
        let mut deleted = 0;
        for chunk in stale.chunks(self.chunk_size()) {
            self.store
                .delete_documents(name, chunk)
                .map_err(|e| BackupError::provider(name, e))?;
            deleted += chunk.len();
            progress.emit(Phase::Deleting, name, deleted, total);
        }

        if total > 0 {
            debug!(collection = %name, deleted, "Stale documents removed");
        }
        Ok(deleted)
    }

    fn verify_collection(
        &self,
        name: &str,
        documents: &[StoredDocument<S::Timestamp>],
        check_extra: bool,
    ) -> BackupResult<()> {
        // Expected content goes through the same encode step as live
        // content, so date and timestamp wrappers compare equal
        let expected: BTreeMap<String, String> = documents
            .iter()
            .map(|doc| (doc.id.clone(), stable_stringify(&serialize_value(&doc.data))))
            .collect();

        let live: BTreeMap<String, String> = self
            .store
            .list_documents(name)
            .map_err(|e| BackupError::provider(name, e))?
            .into_iter()
            .map(|doc| (doc.id, stable_stringify(&serialize_value(&doc.data))))
            .collect();

        let report = diff_documents(&expected, &live, check_extra);
        if report.is_clean() {
            return Ok(());
        }

        warn!(collection = %name, defects = report.defect_count(), "Verification failed");
        Err(BackupError::Verification {
            collection: name.to_string(),
            report,
        })
    }
}

/// Record a collection as skipped, or fail in strict mode
fn skip_collection(
    name: &str,
    reason: &str,
    strict: bool,
    result: &mut RestoreResult,
) -> BackupResult<()> {
    if strict {
        return Err(BackupError::strict(name, reason));
    }
    warn!(collection = %name, reason, "Collection skipped");
    result.collections_skipped.push(name.to_string());
    Ok(())
}

/// Permission failures follow the skip policy; anything else is fatal
fn skip_on_permission(
    name: &str,
    step: &str,
    err: BackupError,
    strict: bool,
    result: &mut RestoreResult,
) -> BackupResult<()> {
    match err {
        BackupError::Provider { source, .. } if source.is_permission_denied() => {
            let reason = format!("permission denied while {}: {}", step, source);
            skip_collection(name, &reason, strict, result)
        }
        other => Err(other),
    }
}
