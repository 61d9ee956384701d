use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use obra_backup::cli::{handle_backup_command, BackupCommands};
use obra_backup::config::{BackupPaths, Settings};

/// Log filter variable, checked before `RUST_LOG`
const LOG_ENV: &str = "OBRA_BACKUP_LOG";

#[derive(Parser)]
#[command(
    name = "obra-backup",
    version,
    about = "Backup and restore for the construction management document store",
    long_about = "obra-backup snapshots every configured collection of the document \
                  store into a portable JSON backup, keeps the newest backups in an \
                  archive, and restores them with optional replace, strict and \
                  verify modes."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Show current configuration and paths
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = BackupPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            paths.ensure_directories()?;
            handle_backup_command(&paths, &settings, cmd)?;
        }
        Some(Commands::Config) => {
            println!("obra-backup Configuration");
            println!("=========================");
            println!("Base directory:    {}", paths.base_dir().display());
            println!("Data directory:    {}", paths.data_dir().display());
            println!("Archive directory: {}", paths.archive_dir().display());
            println!("Export directory:  {}", paths.export_dir().display());
            println!("Audit log:         {}", paths.audit_log().display());
            println!();
            println!("Settings:");
            println!("  Collections:        {}", settings.collections.join(", "));
            println!("  Identity:           {}", settings.identity_collection);
            println!("  Restore order:      {}", settings.restore_order().join(", "));
            println!("  Batch size:         {}", settings.batch_size);
            println!("  Archive retention:  {}", settings.retention.max_records);
            println!(
                "  Restore defaults:   replace={} strict={} verify={} reject_invalid_dates={}",
                settings.restore.replace_existing,
                settings.restore.strict,
                settings.restore.verify_after_restore,
                settings.restore.reject_invalid_dates
            );
        }
        None => {
            println!("obra-backup - document store backup and restore");
            println!();
            println!("Run 'obra-backup --help' for usage information.");
        }
    }

    Ok(())
}
