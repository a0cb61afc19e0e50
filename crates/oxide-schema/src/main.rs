//! oxide-schema CLI
//!
//! Command-line tool for diffing schema snapshots and generating migration SQL.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::prelude::*;

/// Schema snapshot diffing and migration SQL synthesis.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target dialect (postgres, sqlite or libsql).
    #[arg(short, long, env = "OXIDE_SCHEMA_DIALECT", default_value = "postgres")]
    dialect: Dialect,

    /// Synthesis configuration file (JSON).
    #[arg(short, long, env = "OXIDE_SCHEMA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a snapshot for structural errors.
    Validate {
        /// Snapshot file.
        snapshot: PathBuf,
    },

    /// Print the structural diff between two snapshots as JSON.
    Diff {
        /// Snapshot currently deployed.
        old: PathBuf,
        /// Snapshot to migrate to.
        new: PathBuf,
    },

    /// Print the SQL creating a snapshot from an empty database.
    Bootstrap {
        /// Snapshot file.
        snapshot: PathBuf,

        /// Write the access-control diff (JSON) to this file.
        #[arg(long)]
        access_control_out: Option<PathBuf>,
    },

    /// Print the SQL migrating one snapshot to another.
    Migrate {
        /// Snapshot currently deployed.
        old: PathBuf,
        /// Snapshot to migrate to.
        new: PathBuf,

        /// Write the access-control diff (JSON) to this file.
        #[arg(long)]
        access_control_out: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => SynthesisConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SynthesisConfig::default(),
    };
    let synthesizer = Synthesizer::new().config(config);

    match cli.command {
        Commands::Validate { snapshot } => {
            let snapshot = load_snapshot(&snapshot)?;
            info!("Snapshot is valid ({} tables).", snapshot.tables.len());
        }

        Commands::Diff { old, new } => {
            let old = load_snapshot(&old)?;
            let new = load_snapshot(&new)?;
            let diff = diff_snapshots(&old, &new);
            if diff.is_empty() {
                info!("No changes detected.");
            }
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }

        Commands::Bootstrap {
            snapshot,
            access_control_out,
        } => {
            let snapshot = load_snapshot(&snapshot)?;
            let migration = synthesizer.bootstrap(&snapshot, cli.dialect)?;
            emit(&migration, access_control_out.as_deref())?;
        }

        Commands::Migrate {
            old,
            new,
            access_control_out,
        } => {
            let old = load_snapshot(&old)?;
            let new = load_snapshot(&new)?;
            let migration = synthesizer.migrate(&old, &new, cli.dialect)?;
            if migration.is_empty() {
                info!("No changes detected.");
            } else if !migration.warnings.is_empty() {
                info!("{} change(s) need manual attention.", migration.warnings.len());
            }
            emit(&migration, access_control_out.as_deref())?;
        }
    }

    Ok(())
}

/// Reads and validates a snapshot file.
fn load_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let snapshot = Snapshot::from_path(path)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    snapshot
        .validate()
        .with_context(|| format!("invalid snapshot {}", path.display()))?;
    Ok(snapshot)
}

/// Prints the SQL and optionally writes the access-control artifact.
fn emit(migration: &Migration, access_control_out: Option<&Path>) -> anyhow::Result<()> {
    print!("{}", migration.sql());

    if let Some(path) = access_control_out {
        let json = serde_json::to_string_pretty(&migration.access_control)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing access control to {}", path.display()))?;
        info!("Wrote access control: {}", path.display());
    }
    Ok(())
}
