//! One-shot store migration.
//!
//! Copies accounts, addresses, and listings from one backend to another.
//! Meant to run standalone before the web process is started; it takes no
//! locks against concurrent writers.
//!
//! ```text
//! migrate --source mongo --source-url mongodb://localhost:27017 --source-db domivka \
//!         --dest extended --dest-url postgres://localhost/domivka --mode upsert
//! ```

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use domivka::migration::{CopyMode, Migrator};
use domivka::server::BackendConfig;

/// Backend kinds addressable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Diesel ORM over PostgreSQL.
    Postgres,
    /// MongoDB document store.
    Mongo,
    /// Raw-SQL PostgreSQL with full-text/JSONB extras.
    Extended,
}

/// Write strategy for the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Insert unconditionally; re-running can duplicate address rows.
    Plain,
    /// Upsert by natural key; re-running is idempotent.
    Upsert,
}

impl From<Mode> for CopyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Plain => Self::Plain,
            Mode::Upsert => Self::Upsert,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Copy all records from one listing store into another")]
struct Args {
    /// Source backend kind.
    #[arg(long, value_enum)]
    source: BackendKind,
    /// Source connection URL.
    #[arg(long)]
    source_url: String,
    /// Source database name (document backend only).
    #[arg(long, default_value = "domivka")]
    source_db: String,

    /// Destination backend kind.
    #[arg(long, value_enum)]
    dest: BackendKind,
    /// Destination connection URL.
    #[arg(long)]
    dest_url: String,
    /// Destination database name (document backend only).
    #[arg(long, default_value = "domivka")]
    dest_db: String,

    /// Write strategy for the destination.
    #[arg(long, value_enum, default_value = "upsert")]
    mode: Mode,
}

fn backend_config(kind: BackendKind, url: &str, db: &str) -> BackendConfig {
    match kind {
        BackendKind::Postgres => BackendConfig::Relational {
            database_url: url.to_owned(),
        },
        BackendKind::Mongo => BackendConfig::Document {
            uri: url.to_owned(),
            database: db.to_owned(),
        },
        BackendKind::Extended => BackendConfig::Extended {
            database_url: url.to_owned(),
        },
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(e) = fmt().with_env_filter(EnvFilter::from_default_env()).try_init() {
        warn!(error = %e, "tracing init failed");
    }

    let args = Args::parse();
    let source_config = backend_config(args.source, &args.source_url, &args.source_db);
    let dest_config = backend_config(args.dest, &args.dest_url, &args.dest_db);

    // `connect` prepares the destination schema, so the bulk inserts below
    // have their tables and indexes in place before the first row lands.
    let source = match source_config.connect().await {
        Ok(handles) => handles.store,
        Err(err) => {
            error!(error = %err, "failed to connect to source store");
            return std::process::ExitCode::FAILURE;
        }
    };
    let dest = match dest_config.connect().await {
        Ok(handles) => handles.store,
        Err(err) => {
            error!(error = %err, "failed to connect to destination store");
            return std::process::ExitCode::FAILURE;
        }
    };

    let mut migrator = Migrator::new(source, dest, args.mode.into());
    if migrator.run().await {
        info!("migration finished");
        std::process::ExitCode::SUCCESS
    } else {
        error!("migration failed; destination may hold a partial copy");
        std::process::ExitCode::FAILURE
    }
}
