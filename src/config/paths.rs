//! Path management for obra-backup
//!
//! ## Path Resolution Order
//!
//! 1. `OBRA_BACKUP_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/obra-backup` or `~/.config/obra-backup`
//! 3. Windows: `%APPDATA%\obra-backup`

use std::path::PathBuf;

use crate::error::BackupError;

/// Environment variable overriding the base directory
pub const BASE_DIR_ENV: &str = "OBRA_BACKUP_DIR";

/// Manages all paths used by obra-backup
#[derive(Debug, Clone)]
pub struct BackupPaths {
    base_dir: PathBuf,
}

impl BackupPaths {
    /// Resolve the base directory from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = match std::env::var(BASE_DIR_ENV) {
            Ok(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create BackupPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory of the file-backed document store
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Directory of the backup archive
    pub fn archive_dir(&self) -> PathBuf {
        self.base_dir.join("archive")
    }

    /// Default target for exported backup files
    pub fn export_dir(&self) -> PathBuf {
        self.base_dir.join("exports")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Ensure the base, data and archive directories exist
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        for dir in [self.base_dir.clone(), self.data_dir(), self.archive_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                BackupError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, BackupError> {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(config_home).join("obra-backup"));
    }
    let home = std::env::var("HOME")
        .map_err(|_| BackupError::Config("Could not determine HOME directory".into()))?;
    Ok(PathBuf::from(home).join(".config").join("obra-backup"))
}

#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, BackupError> {
    let appdata = std::env::var("APPDATA")
        .map_err(|_| BackupError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("obra-backup"))
}
