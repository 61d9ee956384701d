//! Backup archive with a retention cap
//!
//! Saved backups live in a keyed [`ArchiveStore`] next to a small metadata
//! record, so listing never has to read payloads. After each save only the
//! newest `max_records` backups are kept.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::types::BackupPayload;
use crate::codec::parse_iso;
use crate::config::ArchiveRetention;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{read_json, remove_if_exists, write_json_atomic};

/// Listing information for an archived backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub id: String,
    /// Display name derived from the creation time
    pub name: String,
    pub created_at: String,
    /// Length of the payload's JSON text
    pub size_bytes: u64,
    pub documents: usize,
}

/// An archived backup record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBackup {
    #[serde(flatten)]
    pub metadata: BackupMetadata,
    pub payload: BackupPayload,
}

/// Keyed storage for archived backups
pub trait ArchiveStore {
    /// Insert or replace a record under its id
    fn put(&self, record: &StoredBackup) -> BackupResult<()>;

    fn get(&self, id: &str) -> BackupResult<Option<StoredBackup>>;

    /// Metadata of every record, in no particular order
    fn list_metadata(&self) -> BackupResult<Vec<BackupMetadata>>;

    /// Remove a record, returning whether it existed
    fn delete(&self, id: &str) -> BackupResult<bool>;
}

fn lock_error<E: std::fmt::Display>(err: E) -> BackupError {
    BackupError::Archive(format!("archive lock poisoned: {}", err))
}

/// Archive kept in memory
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    records: RwLock<HashMap<String, StoredBackup>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn put(&self, record: &StoredBackup) -> BackupResult<()> {
        let mut records = self.records.write().map_err(lock_error)?;
        records.insert(record.metadata.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> BackupResult<Option<StoredBackup>> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(records.get(id).cloned())
    }

    fn list_metadata(&self) -> BackupResult<Vec<BackupMetadata>> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(records.values().map(|r| r.metadata.clone()).collect())
    }

    fn delete(&self, id: &str) -> BackupResult<bool> {
        let mut records = self.records.write().map_err(lock_error)?;
        Ok(records.remove(id).is_some())
    }
}

const META_SUFFIX: &str = ".meta.json";

/// Archive kept in a directory as `<id>.json` payload files plus
/// `<id>.meta.json` metadata files
#[derive(Debug, Clone)]
pub struct FileArchiveStore {
    dir: PathBuf,
}

impl FileArchiveStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn paths(&self, id: &str) -> BackupResult<(PathBuf, PathBuf)> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(BackupError::Archive(format!("invalid backup id '{}'", id)));
        }
        Ok((
            self.dir.join(format!("{}.json", id)),
            self.dir.join(format!("{}{}", id, META_SUFFIX)),
        ))
    }
}

impl ArchiveStore for FileArchiveStore {
    fn put(&self, record: &StoredBackup) -> BackupResult<()> {
        let (payload_path, meta_path) = self.paths(&record.metadata.id)?;
        // Metadata last: a record is listed only once its payload is on disk
        write_json_atomic(&payload_path, &record.payload, false)?;
        write_json_atomic(&meta_path, &record.metadata, true)?;
        Ok(())
    }

    fn get(&self, id: &str) -> BackupResult<Option<StoredBackup>> {
        let (payload_path, meta_path) = match self.paths(id) {
            Ok(paths) => paths,
            Err(_) => return Ok(None),
        };
        let Some(metadata) = read_json::<BackupMetadata, _>(&meta_path)? else {
            return Ok(None);
        };
        let payload = read_json::<BackupPayload, _>(&payload_path)?.ok_or_else(|| {
            BackupError::Archive(format!("payload file for backup '{}' is missing", id))
        })?;
        Ok(Some(StoredBackup { metadata, payload }))
    }

    fn list_metadata(&self) -> BackupResult<Vec<BackupMetadata>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(META_SUFFIX));
            if !is_meta {
                continue;
            }
            if let Some(metadata) = read_json::<BackupMetadata, _>(&path)? {
                all.push(metadata);
            }
        }
        Ok(all)
    }

    fn delete(&self, id: &str) -> BackupResult<bool> {
        let (payload_path, meta_path) = match self.paths(id) {
            Ok(paths) => paths,
            Err(_) => return Ok(false),
        };
        let existed = remove_if_exists(&meta_path)?;
        remove_if_exists(&payload_path)?;
        Ok(existed)
    }
}

/// Display name for a backup created at `created_at`
pub fn display_name(created_at: &str) -> String {
    match parse_iso(created_at) {
        Some(at) => format!("Backup {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => format!("Backup {}", created_at),
    }
}

/// Newest first; unparsable creation times sort last
fn newest_first(a: &BackupMetadata, b: &BackupMetadata) -> Ordering {
    match (parse_iso(&a.created_at), parse_iso(&b.created_at)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at),
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Saves, lists and evicts archived backups
#[derive(Debug)]
pub struct BackupArchive<A: ArchiveStore> {
    store: A,
    retention: ArchiveRetention,
}

impl<A: ArchiveStore> BackupArchive<A> {
    pub fn new(store: A, retention: ArchiveRetention) -> Self {
        Self { store, retention }
    }

    pub fn store(&self) -> &A {
        &self.store
    }

    /// Archive a payload and enforce retention
    pub fn save(&self, payload: &BackupPayload) -> BackupResult<BackupMetadata> {
        let (metadata, _) = self.save_with_evictions(payload)?;
        Ok(metadata)
    }

    /// Archive a payload, returning its metadata and the records evicted
    pub fn save_with_evictions(
        &self,
        payload: &BackupPayload,
    ) -> BackupResult<(BackupMetadata, Vec<BackupMetadata>)> {
        self.save_keeping(payload, None)
    }

    /// Like [`save_with_evictions`](Self::save_with_evictions), but the
    /// record `keep` is never evicted even when it is beyond the limit
    pub fn save_keeping(
        &self,
        payload: &BackupPayload,
        keep: Option<&str>,
    ) -> BackupResult<(BackupMetadata, Vec<BackupMetadata>)> {
        let text = serde_json::to_string(payload)?;
        let metadata = BackupMetadata {
            id: Uuid::new_v4().to_string(),
            name: display_name(&payload.created_at),
            created_at: payload.created_at.clone(),
            size_bytes: text.len() as u64,
            documents: payload.document_count(),
        };

        self.store.put(&StoredBackup {
            metadata: metadata.clone(),
            payload: payload.clone(),
        })?;
        info!(id = %metadata.id, size = metadata.size_bytes, "Backup archived");

        let evicted = self.enforce_retention_keeping(keep)?;
        Ok((metadata, evicted))
    }

    /// Delete every record beyond the newest `max_records`
    pub fn enforce_retention(&self) -> BackupResult<Vec<BackupMetadata>> {
        self.enforce_retention_keeping(None)
    }

    /// Delete every record beyond the newest `max_records` except `keep`,
    /// which may leave one record over the limit until the next save
    pub fn enforce_retention_keeping(
        &self,
        keep: Option<&str>,
    ) -> BackupResult<Vec<BackupMetadata>> {
        let evicted: Vec<BackupMetadata> = self
            .list()?
            .into_iter()
            .skip(self.retention.max_records)
            .filter(|record| Some(record.id.as_str()) != keep)
            .collect();

        for record in &evicted {
            self.store.delete(&record.id)?;
            info!(id = %record.id, created_at = %record.created_at, "Backup evicted");
        }
        Ok(evicted)
    }

    /// Metadata of every archived backup, newest first
    pub fn list(&self) -> BackupResult<Vec<BackupMetadata>> {
        let mut all = self.store.list_metadata()?;
        all.sort_by(newest_first);
        Ok(all)
    }

    /// Load an archived payload
    pub fn get(&self, id: &str) -> BackupResult<BackupPayload> {
        self.store
            .get(id)?
            .map(|record| record.payload)
            .ok_or_else(|| BackupError::backup_not_found(id))
    }

    pub fn metadata(&self, id: &str) -> BackupResult<BackupMetadata> {
        self.list()?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| BackupError::backup_not_found(id))
    }

    /// Remove an archived backup
    pub fn delete(&self, id: &str) -> BackupResult<()> {
        if self.store.delete(id)? {
            Ok(())
        } else {
            Err(BackupError::backup_not_found(id))
        }
    }

    /// Metadata of the newest archived backup
    pub fn latest(&self) -> BackupResult<Option<BackupMetadata>> {
        Ok(self.list()?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::types::BackupStats;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn payload_at(created_at: &str) -> BackupPayload {
        BackupPayload {
            version: 1,
            created_at: created_at.to_string(),
            source: "obra-backup".to_string(),
            collections: BTreeMap::new(),
            stats: BackupStats::default(),
        }
    }

    fn stamp(minute: u32) -> String {
        format!("2024-05-01T10:{:02}:00.000Z", minute)
    }

    #[test]
    fn test_save_records_metadata() {
        let archive = BackupArchive::new(MemoryArchiveStore::new(), ArchiveRetention::default());
        let payload = payload_at("2024-05-01T10:30:15.250Z");

        let meta = archive.save(&payload).unwrap();

        assert_eq!(meta.name, "Backup 2024-05-01 10:30:15 UTC");
        assert_eq!(meta.created_at, payload.created_at);
        assert_eq!(
            meta.size_bytes,
            serde_json::to_string(&payload).unwrap().len() as u64
        );
        assert!(Uuid::parse_str(&meta.id).is_ok());
        assert_eq!(archive.get(&meta.id).unwrap(), payload);
    }

    #[test]
    fn test_eleventh_save_evicts_oldest() {
        let archive = BackupArchive::new(MemoryArchiveStore::new(), ArchiveRetention::default());

        let mut ids = Vec::new();
        for minute in 0..10 {
            let (meta, evicted) = archive.save_with_evictions(&payload_at(&stamp(minute))).unwrap();
            assert!(evicted.is_empty());
            ids.push(meta.id);
        }

        let (_, evicted) = archive.save_with_evictions(&payload_at(&stamp(10))).unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, ids[0]);

        let listed = archive.list().unwrap();
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0].created_at, stamp(10));
        assert_eq!(listed[9].created_at, stamp(1));
    }

    #[test]
    fn test_retention_keys_on_created_at_not_save_order() {
        let archive = BackupArchive::new(
            MemoryArchiveStore::new(),
            ArchiveRetention { max_records: 2 },
        );
        archive.save(&payload_at(&stamp(30))).unwrap();
        archive.save(&payload_at(&stamp(20))).unwrap();

        // an imported older backup is evicted straight away
        let (meta, evicted) = archive.save_with_evictions(&payload_at(&stamp(5))).unwrap();
        assert_eq!(evicted, vec![meta]);
    }

    #[test]
    fn test_kept_record_survives_retention() {
        let archive = BackupArchive::new(
            MemoryArchiveStore::new(),
            ArchiveRetention { max_records: 2 },
        );
        let oldest = archive.save(&payload_at(&stamp(0))).unwrap();
        archive.save(&payload_at(&stamp(1))).unwrap();

        let (_, evicted) = archive
            .save_keeping(&payload_at(&stamp(2)), Some(&oldest.id))
            .unwrap();
        assert!(evicted.is_empty());
        assert_eq!(archive.list().unwrap().len(), 3);
        assert!(archive.get(&oldest.id).is_ok());

        // the next plain save catches up
        let (_, evicted) = archive.save_with_evictions(&payload_at(&stamp(3))).unwrap();
        assert_eq!(evicted.len(), 2);
        assert_eq!(evicted[1].id, oldest.id);
    }

    #[test]
    fn test_get_and_delete_missing() {
        let archive = BackupArchive::new(MemoryArchiveStore::new(), ArchiveRetention::default());
        assert!(archive.get("nope").unwrap_err().is_not_found());
        assert!(archive.delete("nope").unwrap_err().is_not_found());
        assert_eq!(archive.latest().unwrap(), None);
    }

    #[test]
    fn test_file_archive_round_trip() {
        let temp = TempDir::new().unwrap();
        let archive = BackupArchive::new(
            FileArchiveStore::new(temp.path().join("archive")),
            ArchiveRetention::default(),
        );

        let older = archive.save(&payload_at(&stamp(1))).unwrap();
        let newer = archive.save(&payload_at(&stamp(2))).unwrap();

        assert!(temp
            .path()
            .join("archive")
            .join(format!("{}.meta.json", newer.id))
            .exists());
        assert_eq!(archive.latest().unwrap(), Some(newer.clone()));
        assert_eq!(archive.get(&older.id).unwrap().created_at, stamp(1));
        assert_eq!(archive.metadata(&older.id).unwrap(), older);

        archive.delete(&older.id).unwrap();
        assert_eq!(archive.list().unwrap(), vec![newer]);
        assert!(!temp
            .path()
            .join("archive")
            .join(format!("{}.json", older.id))
            .exists());
    }

    #[test]
    fn test_file_archive_rejects_path_like_ids() {
        let temp = TempDir::new().unwrap();
        let store = FileArchiveStore::new(temp.path().to_path_buf());
        assert_eq!(store.get("../escape").unwrap(), None);
        assert!(!store.delete("../escape").unwrap());
    }

    #[test]
    fn test_list_on_missing_directory() {
        let temp = TempDir::new().unwrap();
        let store = FileArchiveStore::new(temp.path().join("absent"));
        assert!(store.list_metadata().unwrap().is_empty());
    }
}
