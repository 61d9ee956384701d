//! In-memory document store
//!
//! Keeps collections in a `RwLock`-guarded map. Failures can be injected per
//! collection and operation, and batch commits are counted, which makes this
//! store the workhorse of the engine's tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::value::{StoreValue, StoredDocument, Timestamp};
use super::{DocumentStore, StoreError, StoreErrorKind, StoreResult, DEFAULT_BATCH_SIZE};

type Collections = BTreeMap<String, BTreeMap<String, StoreValue>>;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    List,
    Set,
    Delete,
}

/// Document store held entirely in memory
pub struct MemoryStore {
    collections: RwLock<Collections>,
    failures: RwLock<HashMap<(String, StoreOperation), StoreErrorKind>>,
    max_batch: usize,
    set_commits: AtomicUsize,
    delete_commits: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::internal(format!("Failed to acquire lock: {}", e))
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_max_batch(DEFAULT_BATCH_SIZE)
    }

    /// Create an empty store accepting at most `max_batch` operations per commit
    pub fn with_max_batch(max_batch: usize) -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(HashMap::new()),
            max_batch: max_batch.max(1),
            set_commits: AtomicUsize::new(0),
            delete_commits: AtomicUsize::new(0),
        }
    }

    /// Insert or replace a single document outside of any batch
    pub fn insert(
        &self,
        collection: &str,
        id: impl Into<String>,
        data: impl Into<StoreValue>,
    ) -> StoreResult<()> {
        let mut collections = self.collections.write().map_err(lock_error)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), data.into());
        Ok(())
    }

    /// Get a single document
    pub fn get(&self, collection: &str, id: &str) -> StoreResult<Option<StoreValue>> {
        let collections = self.collections.read().map_err(lock_error)?;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    /// Ids currently present in a collection, sorted
    pub fn ids(&self, collection: &str) -> StoreResult<Vec<String>> {
        let collections = self.collections.read().map_err(lock_error)?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        let collections = self.collections.read().map_err(lock_error)?;
        Ok(collections.get(collection).map_or(0, |docs| docs.len()))
    }

    /// Make every future `op` on `collection` fail with `kind`
    pub fn fail(&self, collection: &str, op: StoreOperation, kind: StoreErrorKind) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert((collection.to_string(), op), kind);
        }
    }

    /// Make every future `op` on `collection` fail with a permission error
    pub fn deny(&self, collection: &str, op: StoreOperation) {
        self.fail(collection, op, StoreErrorKind::PermissionDenied);
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.write() {
            failures.clear();
        }
    }

    /// Number of `set_documents` commits so far
    pub fn set_commits(&self) -> usize {
        self.set_commits.load(Ordering::SeqCst)
    }

    /// Number of `delete_documents` commits so far
    pub fn delete_commits(&self) -> usize {
        self.delete_commits.load(Ordering::SeqCst)
    }

    /// Reset the commit counters
    pub fn reset_commits(&self) {
        self.set_commits.store(0, Ordering::SeqCst);
        self.delete_commits.store(0, Ordering::SeqCst);
    }

    fn check(&self, collection: &str, op: StoreOperation) -> StoreResult<()> {
        let failures = self.failures.read().map_err(lock_error)?;
        match failures.get(&(collection.to_string(), op)) {
            Some(kind) => Err(StoreError::new(
                *kind,
                format!("{:?} on '{}' rejected", op, collection),
            )),
            None => Ok(()),
        }
    }

    fn check_batch(&self, len: usize) -> StoreResult<()> {
        if len > self.max_batch {
            return Err(StoreError::new(
                StoreErrorKind::InvalidArgument,
                format!("batch of {} exceeds limit of {}", len, self.max_batch),
            ));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    type Timestamp = Timestamp;

    fn list_documents(&self, collection: &str) -> StoreResult<Vec<StoredDocument>> {
        self.check(collection, StoreOperation::List)?;
        let collections = self.collections.read().map_err(lock_error)?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| StoredDocument {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn set_documents(&self, collection: &str, batch: &[StoredDocument]) -> StoreResult<()> {
        self.check(collection, StoreOperation::Set)?;
        self.check_batch(batch.len())?;

        let mut collections = self.collections.write().map_err(lock_error)?;
        let docs = collections.entry(collection.to_string()).or_default();
        for doc in batch {
            docs.insert(doc.id.clone(), doc.data.clone());
        }
        self.set_commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_documents(&self, collection: &str, ids: &[String]) -> StoreResult<()> {
        self.check(collection, StoreOperation::Delete)?;
        self.check_batch(ids.len())?;

        let mut collections = self.collections.write().map_err(lock_error)?;
        if let Some(docs) = collections.get_mut(collection) {
            for id in ids {
                docs.remove(id);
            }
        }
        self.delete_commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_list() {
        let store = MemoryStore::new();
        store
            .set_documents(
                "obras",
                &[
                    StoredDocument::new("o1", json!({"nombre": "Torre A"})),
                    StoredDocument::new("o2", json!({"nombre": "Puente"})),
                ],
            )
            .unwrap();

        let docs = store.list_documents("obras").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(store.set_commits(), 1);
        assert!(store.list_documents("missing").unwrap().is_empty());
    }

    #[test]
    fn test_delete_ignores_unknown_ids() {
        let store = MemoryStore::new();
        store.insert("users", "u1", json!({"name": "Ana"})).unwrap();

        store
            .delete_documents("users", &["u1".to_string(), "zz".to_string()])
            .unwrap();
        assert_eq!(store.count("users").unwrap(), 0);
        assert_eq!(store.delete_commits(), 1);
    }

    #[test]
    fn test_injected_failure() {
        let store = MemoryStore::new();
        store.deny("users", StoreOperation::List);

        let err = store.list_documents("users").unwrap_err();
        assert!(err.is_permission_denied());
        assert!(store.list_documents("obras").is_ok());

        store.clear_failures();
        assert!(store.list_documents("users").is_ok());
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let store = MemoryStore::with_max_batch(2);
        let batch: Vec<StoredDocument> = (0..3)
            .map(|i| StoredDocument::new(format!("d{}", i), json!({})))
            .collect();

        let err = store.set_documents("obras", &batch).unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::InvalidArgument);
        assert_eq!(store.set_commits(), 0);
    }
}
