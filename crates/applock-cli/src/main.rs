//! Command-line surface for inspecting and driving the application lock.
//!
//! Covers the day-to-day operations (status, lock, unlock) plus the
//! backup/restore flow built on the force-set escape hatch.

use anyhow::{bail, Context, Result};
use applock_core::{logging, FileStore, LockSystem, PersistedRecord};
use clap::{Parser, Subcommand};
use log::warn;
use rpassword::prompt_password;
use std::fs;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Top-level options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "applock",
    version,
    about = "Gate the scheduling application behind a shared password."
)]
struct Cli {
    /// Directory holding the persisted lock state (defaults to the platform
    /// data directory, override with APPLOCK_STATE_DIR).
    #[arg(long)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show whether the application is currently locked.
    Status,

    /// Engage the lock with a new password (also changes the password).
    Lock {
        /// Password to use; prompts interactively when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Attempt to disengage the lock.
    Unlock {
        /// Password to try; prompts interactively when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Write the persisted lock record as JSON for backup.
    Export {
        /// Destination file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Restore a previously exported lock record, bypassing verification.
    Import {
        /// Path to the exported JSON record.
        path: PathBuf,

        /// Overwrite the current lock state even when a lock or password is
        /// already set.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();

    let store = match &cli.state_dir {
        Some(dir) => FileStore::at(dir),
        None => FileStore::open_default().context("failed to resolve a state directory")?,
    };
    let mut system = LockSystem::new(store);
    system.initialize();

    match cli.command {
        Commands::Status => {
            let state = if system.is_locked() { "locked" } else { "unlocked" };
            let password = if system.password_digest().is_some() {
                "password set"
            } else {
                "no password set"
            };
            println!("{state} ({password})");
        }
        Commands::Lock { password } => {
            let password = capture_password(password, "New password: ")?;
            if !system.engage(&password).await? {
                bail!("password must not be empty");
            }
            println!("Application locked.");
        }
        Commands::Unlock { password } => {
            let password = capture_password(password, "Password: ")?;
            if !system.disengage(&password).await? {
                bail!("wrong password");
            }
            println!("Application unlocked.");
        }
        Commands::Export { output } => {
            let payload = serde_json::to_string_pretty(&system.snapshot())
                .context("failed to serialize lock record")?;
            match output {
                Some(path) => {
                    fs::write(&path, payload)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Exported lock state to {}.", path.display());
                }
                None => println!("{payload}"),
            }
        }
        Commands::Import { path, force } => {
            if import_blocked(&system.snapshot(), force) {
                bail!(
                    "a lock or password is already set; pass --force to overwrite it with {}",
                    path.display()
                );
            }
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let record = PersistedRecord::parse(&raw)
                .with_context(|| format!("{} is not a valid lock record", path.display()))?;
            if record.is_locked && record.password.is_none() {
                warn!("imported record is locked but carries no password digest");
            }
            system.set_lock_state(record.is_locked, record.password)?;
            println!("Imported lock state from {}.", path.display());
        }
    }

    Ok(())
}

fn capture_password(arg: Option<String>, prompt: &str) -> Result<Zeroizing<String>> {
    let plaintext = match arg {
        Some(password) => password,
        None => prompt_password(prompt).context("failed to read password")?,
    };
    Ok(Zeroizing::new(plaintext))
}

// Importing over an engaged lock or a live digest needs an explicit --force;
// a pristine state can always be overwritten.
fn import_blocked(current: &PersistedRecord, force: bool) -> bool {
    !force && (current.is_locked || current.password.is_some())
}
