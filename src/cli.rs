//! CLI argument parsing and startup helpers.

use crate::db::Database;
use crate::migrator;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MigrateAction {
    /// Apply every pending migration under `--dir`.
    Push,
    /// List every migration under `--dir` with its applied/pending status.
    List,
    /// Scaffold a new, empty migration file.
    New {
        /// Short descriptive name, e.g. "create widgets".
        name: String,
    },
    /// Print the `CREATE TABLE` DDL for every table in the type catalog.
    Export,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage the schema migration ledger.
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
        /// Directory containing migration files.
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sblite", about = "Single-binary Supabase-compatible backend")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "failed to open database");
            None
        }
    }
}

/// Run a `migrate` subcommand against the database at `db_path`, printing a
/// human-readable summary. Exits the process on failure.
pub async fn run_migrate(db_path: &str, action: &MigrateAction, dir: &std::path::Path) {
    let Some(db) = open_database(db_path).await else {
        std::process::exit(1);
    };

    let result = match action {
        MigrateAction::Push => migrator::push(&db, dir).await.map(|applied| {
            if applied.is_empty() {
                println!("nothing to apply");
            } else {
                for id in &applied {
                    println!("applied {id}");
                }
            }
        }),
        MigrateAction::List => migrator::list(&db, dir).await.map(|statuses| {
            for status in statuses {
                let marker = if status.applied { "applied" } else { "pending" };
                println!("{:<9} {}", marker, status.id);
            }
        }),
        MigrateAction::New { name } => {
            migrator::new_migration(dir, name, chrono::Utc::now()).map(|path| {
                println!("created {}", path.display());
            })
        }
        MigrateAction::Export => migrator::export(&db).await.map(|ddl| {
            println!("{ddl}");
        }),
    };

    if let Err(e) = result {
        error!(error = %e, "migrate command failed");
        std::process::exit(1);
    }
}
