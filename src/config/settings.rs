//! User settings for obra-backup
//!
//! Which collections are backed up, the identity collection, batch size,
//! archive retention and restore defaults. Every field has a default so a
//! partial `config.json` is accepted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::collections::{default_collections, restore_order, IDENTITY_COLLECTION};
use super::paths::BackupPaths;
use crate::error::BackupError;
use crate::storage::DEFAULT_BATCH_SIZE;

/// Archive retention settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRetention {
    /// Number of archived backups to keep
    pub max_records: usize,
}

impl Default for ArchiveRetention {
    fn default() -> Self {
        Self { max_records: 10 }
    }
}

/// Defaults applied to restores started from the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreDefaults {
    #[serde(default = "default_true")]
    pub replace_existing: bool,

    #[serde(default = "default_true")]
    pub strict: bool,

    #[serde(default = "default_true")]
    pub verify_after_restore: bool,

    /// Fail a collection instead of nulling a date field that cannot be parsed
    #[serde(default)]
    pub reject_invalid_dates: bool,
}

impl Default for RestoreDefaults {
    fn default() -> Self {
        Self {
            replace_existing: true,
            strict: true,
            verify_after_restore: true,
            reject_invalid_dates: false,
        }
    }
}

/// Settings for obra-backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Collections covered by backups, in backup order
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Collection restored last
    #[serde(default = "default_identity_collection")]
    pub identity_collection: String,

    /// Operations per batched commit
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub retention: ArchiveRetention,

    #[serde(default)]
    pub restore: RestoreDefaults,
}

fn default_schema_version() -> u32 {
    1
}

fn default_identity_collection() -> String {
    IDENTITY_COLLECTION.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            collections: default_collections(),
            identity_collection: default_identity_collection(),
            batch_size: default_batch_size(),
            retention: ArchiveRetention::default(),
            restore: RestoreDefaults::default(),
        }
    }
}

impl Settings {
    /// Settings covering exactly `collections`, everything else default
    pub fn with_collections<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Order in which a restore visits the configured collections
    pub fn restore_order(&self) -> Vec<String> {
        restore_order(&self.collections, &self.identity_collection)
    }

    /// Check the settings for internal consistency
    pub fn validate(&self) -> Result<(), BackupError> {
        if self.collections.is_empty() {
            return Err(BackupError::Config("No collections configured".into()));
        }

        let mut seen = HashSet::new();
        for name in &self.collections {
            if name.trim().is_empty() {
                return Err(BackupError::Config("Empty collection name".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(BackupError::Config(format!(
                    "Collection '{}' is listed twice",
                    name
                )));
            }
        }

        if !seen.contains(self.identity_collection.as_str()) {
            return Err(BackupError::Config(format!(
                "Identity collection '{}' is not in the collection list",
                self.identity_collection
            )));
        }
        if self.batch_size == 0 {
            return Err(BackupError::Config("batch_size must be at least 1".into()));
        }
        if self.retention.max_records == 0 {
            return Err(BackupError::Config(
                "retention.max_records must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &BackupPaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            // Not saved here; the caller decides when to persist
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| BackupError::Io(format!("Failed to read settings file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&contents)
            .map_err(|e| BackupError::Config(format!("Failed to parse settings file: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &BackupPaths) -> Result<(), BackupError> {
        std::fs::create_dir_all(paths.base_dir())
            .map_err(|e| BackupError::Io(format!("Failed to create base directory: {}", e)))?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| BackupError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| BackupError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}
