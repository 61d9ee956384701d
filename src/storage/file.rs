//! Directory-backed document store
//!
//! Each collection is one JSON file under the data directory,
//! `<collection>.json`, holding documents in their portable form so that
//! timestamps survive the trip to disk. Every commit rewrites the file
//! atomically, which makes a batch all-or-nothing.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::file_io::{read_json, write_json_atomic};
use super::value::{StoredDocument, Timestamp};
use super::{DocumentStore, StoreError, StoreErrorKind, StoreResult, DEFAULT_BATCH_SIZE};
use crate::codec::{deserialize_value, serialize_value};

/// On-disk layout of a collection file
#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionFile {
    #[serde(default)]
    documents: BTreeMap<String, Value>,
}

/// Document store keeping one JSON file per collection
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    max_batch: usize,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            max_batch: DEFAULT_BATCH_SIZE,
        }
    }

    /// Path of the file backing `collection`
    pub fn collection_path(&self, collection: &str) -> StoreResult<PathBuf> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::new(
                StoreErrorKind::InvalidArgument,
                format!("invalid collection name '{}'", collection),
            ));
        }
        Ok(self.dir.join(format!("{}.json", collection)))
    }

    fn load(&self, collection: &str) -> StoreResult<CollectionFile> {
        let path = self.collection_path(collection)?;
        Ok(read_json(path)?.unwrap_or_default())
    }

    fn store(&self, collection: &str, file: &CollectionFile) -> StoreResult<()> {
        let path = self.collection_path(collection)?;
        write_json_atomic(path, file, true)?;
        Ok(())
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

impl DocumentStore for FileStore {
    type Timestamp = Timestamp;

    fn list_documents(&self, collection: &str) -> StoreResult<Vec<StoredDocument>> {
        let file = self.load(collection)?;
        Ok(file
            .documents
            .iter()
            .map(|(id, tree)| StoredDocument {
                id: id.clone(),
                data: deserialize_value(tree),
            })
            .collect())
    }

    fn list_ids(&self, collection: &str) -> StoreResult<Vec<String>> {
        Ok(self.load(collection)?.documents.into_keys().collect())
    }

    fn set_documents(&self, collection: &str, batch: &[StoredDocument]) -> StoreResult<()> {
        self.check_batch(batch.len())?;
        let mut file = self.load(collection)?;
        for doc in batch {
            file.documents
                .insert(doc.id.clone(), serialize_value(&doc.data));
        }
        self.store(collection, &file)
    }

    fn delete_documents(&self, collection: &str, ids: &[String]) -> StoreResult<()> {
        self.check_batch(ids.len())?;
        let mut file = self.load(collection)?;
        let before = file.documents.len();
        for id in ids {
            file.documents.remove(id);
        }
        if file.documents.len() == before {
            return Ok(());
        }
        self.store(collection, &file)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}
