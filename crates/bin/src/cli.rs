//! CLI argument definitions for the Folio binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database (default, production-ready)
    Sqlite,
    /// PostgreSQL database (for shared deployments)
    Postgres,
    /// In-memory with JSON persistence (for development and ephemeral deployments)
    Inmemory,
}

/// Folio document revision server
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Folio: revision history and autosave for structured documents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Folio server
    Serve(ServeArgs),
    /// Check health of a running Folio server
    Health(HealthArgs),
}

/// Arguments for the serve command
#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "FOLIO_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "FOLIO_HOST")]
    pub host: String,

    /// Storage backend to use
    #[arg(short, long, default_value = "sqlite", env = "FOLIO_BACKEND")]
    pub backend: Backend,

    /// Data directory for storage files.
    /// For SQLite: stores folio.db
    /// For InMemory: stores folio.json
    #[arg(short = 'D', long, env = "FOLIO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// PostgreSQL connection URL (required when backend=postgres)
    #[arg(long, env = "FOLIO_POSTGRES_URL")]
    pub postgres_url: Option<String>,

    /// JSON file with the coalescing window and scheduler timings
    #[arg(short, long, env = "FOLIO_CONFIG")]
    pub config: Option<PathBuf>,
}

impl ServeArgs {
    /// Directory holding storage files, defaulting to the working directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check
    #[arg(short, long, default_value = "http://127.0.0.1:3000", env = "FOLIO_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}
