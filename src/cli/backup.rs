//! Backup CLI commands
//!
//! Every command works against the file-backed document store under the
//! data directory and the archive under the archive directory.

use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::audit::{AuditEntry, AuditLogger, Operation};
use crate::backup::{
    export_backup, inspect_backup, read_backup_file, BackupArchive, BackupBuilder,
    BackupMetadata, BackupOptions, BackupPayload, FileArchiveStore, ProgressEvent,
    RestoreEngine, RestoreOptions,
};
use crate::config::{BackupPaths, Settings};
use crate::error::{BackupError, BackupResult};
use crate::storage::FileStore;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup of every configured collection
    Create {
        /// Keep the backup even if some collections could not be read
        #[arg(long)]
        allow_partial: bool,

        /// Do not store the backup in the archive
        #[arg(long)]
        no_archive: bool,

        /// Also write the backup file into this directory
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,
    },

    /// List archived backups, newest first
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show what a backup contains
    Info {
        /// Archive id, 'latest', or path to a backup file
        backup: String,
    },

    /// Restore the store from a backup
    Restore {
        /// Archive id, 'latest', or path to a backup file
        backup: String,

        /// Keep live documents that are not in the backup
        #[arg(long)]
        keep_existing: bool,

        /// Skip irregular collections instead of aborting
        #[arg(long)]
        lenient: bool,

        /// Do not re-read restored collections
        #[arg(long)]
        no_verify: bool,

        /// Perform the restore; without it only a preview is printed
        #[arg(short, long)]
        force: bool,
    },

    /// Delete an archived backup
    Delete {
        /// Archive id
        id: String,
    },

    /// Write an archived backup to a file
    Export {
        /// Archive id or 'latest'
        backup: String,

        /// Target directory (defaults to the exports directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Validate a backup file and add it to the archive
    Import {
        /// Path to a backup file
        file: PathBuf,
    },

    /// Show recent entries of the audit log
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

/// Where a backup was loaded from
#[derive(Debug)]
enum Source {
    Archive(BackupMetadata),
    File(PathBuf),
}

impl Source {
    fn describe(&self) -> String {
        match self {
            Source::Archive(meta) => format!("{} ({})", meta.name, meta.id),
            Source::File(path) => path.display().to_string(),
        }
    }
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &BackupPaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> BackupResult<()> {
    let store = FileStore::new(paths.data_dir());
    let archive = BackupArchive::new(
        FileArchiveStore::new(paths.archive_dir()),
        settings.retention.clone(),
    );
    let audit = AuditLogger::new(paths.audit_log());

    match cmd {
        BackupCommands::Create {
            allow_partial,
            no_archive,
            export,
        } => {
            println!("Creating backup...");
            let payload = BackupBuilder::new(&store, settings)
                .create_database_backup(BackupOptions::new().allow_partial(allow_partial))?;

            print_counts(&payload, settings);
            if payload.is_partial() {
                println!(
                    "WARNING: partial backup, unreadable: {}",
                    payload.stats.skipped_collections.join(", ")
                );
            }
            let summary = format!(
                "{} collection(s), {} document(s)",
                payload.stats.collections, payload.stats.documents
            );

            if no_archive {
                audit.log(&AuditEntry::new(Operation::Backup, summary))?;
            } else {
                let metadata = archive_payload(
                    &archive,
                    &audit,
                    &payload,
                    Operation::Backup,
                    &summary,
                    None,
                )?;
                println!("Backup created: {}", metadata.name);
                println!("ID: {}", metadata.id);
            }

            if let Some(dir) = export {
                let path = export_backup(&payload, &dir)?;
                audit.log(&AuditEntry::new(
                    Operation::Export,
                    format!("written to {}", path.display()),
                ))?;
                println!("Exported to: {}", path.display());
            }
        }

        BackupCommands::List { verbose } => {
            let backups = archive.list()?;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: obra-backup backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().enumerate() {
                let age = crate::codec::parse_iso(&backup.created_at)
                    .map(|at| format_duration(chrono::Utc::now().signed_duration_since(at)))
                    .unwrap_or_else(|| "?".to_string());

                if verbose {
                    println!(
                        "{}. {}\n   ID: {}\n   Created: {}\n   Documents: {}\n   Size: {}\n   Age: {}\n",
                        i + 1,
                        backup.name,
                        backup.id,
                        backup.created_at,
                        backup.documents,
                        format_size(backup.size_bytes),
                        age,
                    );
                } else {
                    println!(
                        "  {}. {} [{}] ({} ago, {})",
                        i + 1,
                        backup.name,
                        backup.id,
                        age,
                        format_size(backup.size_bytes),
                    );
                }
            }

            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Info { backup } => {
            let (source, payload) = resolve_backup(&archive, &backup)?;
            let summary = inspect_backup(&payload, &settings.collections);

            println!("Backup Details");
            println!("==============");
            println!("Source: {}", source.describe());
            if let Source::Archive(meta) = &source {
                println!("Size: {}", format_size(meta.size_bytes));
            }
            println!("Created: {}", summary.created_at);
            println!("Format version: {}", summary.version);
            if !summary.source.is_empty() {
                println!("Produced by: {}", summary.source);
            }
            println!();
            println!("Contents:");
            for (name, count) in &summary.collections {
                let marker = if summary.skipped.contains(name) {
                    " (unreadable at backup time)"
                } else {
                    ""
                };
                println!("  {:<16} {:>8}{}", name, count, marker);
                let repeated = payload.duplicate_ids(name);
                if !repeated.is_empty() {
                    println!("    repeated ids, last entry wins: {}", repeated.join(", "));
                }
            }
            println!("  {:<16} {:>8}", "total", summary.documents);
            println!();
            println!("Status: {}", summary.summary());
        }

        BackupCommands::Restore {
            backup,
            keep_existing,
            lenient,
            no_verify,
            force,
        } => {
            let (source, payload) = resolve_backup(&archive, &backup)?;
            let summary = inspect_backup(&payload, &settings.collections);

            let defaults = &settings.restore;
            let replace_existing = defaults.replace_existing && !keep_existing;
            let strict = defaults.strict && !lenient;
            let verify = defaults.verify_after_restore && !no_verify;

            println!("Backup Information");
            println!("==================");
            println!("Source: {}", source.describe());
            println!("Created: {}", summary.created_at);
            println!("Documents: {}", summary.documents);
            println!("Status: {}", summary.summary());
            println!(
                "Mode: {}, {}, {}",
                if replace_existing { "replace" } else { "merge" },
                if strict { "strict" } else { "lenient" },
                if verify { "verify" } else { "no verify" },
            );
            println!();

            if !force {
                if replace_existing {
                    println!("WARNING: documents not in the backup will be DELETED!");
                } else {
                    println!("WARNING: documents in the backup will overwrite current data!");
                }
                println!("To proceed, run again with --force flag:");
                println!("  obra-backup backup restore {} --force", backup);
                return Ok(());
            }

            println!("Creating backup of current data before restore...");
            let current = BackupBuilder::new(&store, settings)
                .create_database_backup(BackupOptions::new().allow_partial(true))?;
            let restoring = match &source {
                Source::Archive(meta) => Some(meta.id.as_str()),
                Source::File(_) => None,
            };
            let safety = archive_payload(
                &archive,
                &audit,
                &current,
                Operation::Backup,
                "pre-restore safety backup",
                restoring,
            )?;
            println!("Pre-restore backup saved: {} ({})", safety.name, safety.id);
            println!();

            println!("Restoring from backup...");
            let mut print_progress = |event: &ProgressEvent| {
                println!(
                    "  {} {}: {}/{}",
                    event.phase, event.collection, event.current, event.total
                );
            };
            let options = RestoreOptions::from_defaults(defaults)
                .replace_existing(replace_existing)
                .strict(strict)
                .verify_after_restore(verify)
                .on_progress(&mut print_progress);
            let result = RestoreEngine::new(&store, settings)
                .restore_database_backup(&payload, options)?;

            let entry = match &source {
                Source::Archive(meta) => {
                    AuditEntry::for_backup(Operation::Restore, meta, result.summary())
                }
                Source::File(path) => AuditEntry::new(
                    Operation::Restore,
                    format!("{} from {}", result.summary(), path.display()),
                ),
            };
            audit.log(&entry)?;

            println!("Restore complete!");
            println!("{}", result.summary());
            if !result.is_complete() {
                println!("\nNote: skipped collections were left untouched.");
            }
        }

        BackupCommands::Delete { id } => {
            let metadata = archive.metadata(&id)?;
            archive.delete(&id)?;
            audit.log(&AuditEntry::for_backup(Operation::Delete, &metadata, "deleted"))?;
            println!("Deleted backup: {} ({})", metadata.name, metadata.id);
        }

        BackupCommands::Export { backup, dir } => {
            let metadata = resolve_archived(&archive, &backup)?;
            let payload = archive.get(&metadata.id)?;
            let dir = dir.unwrap_or_else(|| paths.export_dir());

            let path = export_backup(&payload, &dir)?;
            audit.log(&AuditEntry::for_backup(
                Operation::Export,
                &metadata,
                format!("written to {}", path.display()),
            ))?;
            println!("Exported to: {}", path.display());
        }

        BackupCommands::Import { file } => {
            let payload = read_backup_file(&file)?;
            let summary = format!("imported from {}", file.display());
            let metadata = archive_payload(
                &archive,
                &audit,
                &payload,
                Operation::Import,
                &summary,
                None,
            )?;
            println!("Imported backup: {}", metadata.name);
            println!("ID: {}", metadata.id);
        }

        BackupCommands::History { limit } => {
            let entries = audit.read_recent(limit)?;
            if entries.is_empty() {
                println!("No backup operations recorded yet.");
                return Ok(());
            }

            for entry in &entries {
                println!("{}", entry.format_human_readable());
            }
            println!();
            println!("{} entries from {}", entries.len(), audit.path().display());
        }
    }

    Ok(())
}

/// Archive a payload, recording the save and any evictions. `keep` is
/// exempt from eviction.
fn archive_payload(
    archive: &BackupArchive<FileArchiveStore>,
    audit: &AuditLogger,
    payload: &BackupPayload,
    operation: Operation,
    summary: &str,
    keep: Option<&str>,
) -> BackupResult<BackupMetadata> {
    let (metadata, evicted) = archive.save_keeping(payload, keep)?;
    audit.log(&AuditEntry::for_backup(operation, &metadata, summary))?;

    for old in &evicted {
        audit.log(&AuditEntry::for_backup(
            Operation::Evict,
            old,
            "retention limit reached",
        ))?;
    }
    if !evicted.is_empty() {
        println!("Removed {} old backup(s) beyond the retention limit.", evicted.len());
    }
    Ok(metadata)
}

fn print_counts(payload: &BackupPayload, settings: &Settings) {
    for name in &settings.collections {
        if let Some(entries) = payload.collections.get(name) {
            println!("  {:<16} {:>8}", name, entries.len());
        }
    }
    println!("  {:<16} {:>8}", "total", payload.stats.documents);
}

/// Resolve an archive id or "latest" to archived metadata
fn resolve_archived(
    archive: &BackupArchive<FileArchiveStore>,
    backup: &str,
) -> BackupResult<BackupMetadata> {
    if backup.eq_ignore_ascii_case("latest") {
        return archive
            .latest()?
            .ok_or_else(|| BackupError::backup_not_found("latest"));
    }
    archive.metadata(backup)
}

/// Resolve an archive id, "latest", or a file path to a payload
fn resolve_backup(
    archive: &BackupArchive<FileArchiveStore>,
    backup: &str,
) -> BackupResult<(Source, BackupPayload)> {
    match resolve_archived(archive, backup) {
        Ok(metadata) => {
            let payload = archive.get(&metadata.id)?;
            return Ok((Source::Archive(metadata), payload));
        }
        Err(e) if !e.is_not_found() => return Err(e),
        Err(_) => {}
    }

    let path = Path::new(backup);
    if path.is_file() {
        let payload = read_backup_file(path)?;
        return Ok((Source::File(path.to_path_buf()), payload));
    }

    Err(BackupError::backup_not_found(backup))
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a byte count in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
