//! CLI surface (§6): global flags plus the `scan`/`playlist`/`tag`/
//! `organize`/`serve`/`diagnostics` subcommands, grounded on the teacher's
//! `Args`/`clap::Parser` struct in `ferrex-server/src/main.rs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use audiobook_config::DbType;

#[derive(Parser, Debug)]
#[command(name = "audiobook-organizer", about = "Catalog and organize a personal audiobook library")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Import root to scan/organize (overrides the configured import path).
    #[arg(long = "dir", global = true)]
    pub dir: Option<PathBuf>,

    /// Catalog database path.
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    /// Catalog database backend.
    #[arg(long = "db-type", global = true, value_enum)]
    pub db_type: Option<DbType>,

    /// Directory playlists are written into.
    #[arg(long = "playlists", global = true)]
    pub playlists: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan an import path and ingest new/changed files.
    Scan,
    /// Write an M3U playlist for a series or an entire import path.
    Playlist {
        /// Series name to collect, or omit to playlist the whole library.
        #[arg(long)]
        series: Option<String>,
        /// Playlist file name (without extension).
        #[arg(long, default_value = "playlist")]
        name: String,
    },
    /// Read and print the tags of a single audio file.
    Tag {
        path: PathBuf,
    },
    /// Run the file organizer over the whole catalog.
    Organize {
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the HTTP+SSE server.
    Serve,
    /// Maintenance/inspection commands that don't change catalog data by default.
    Diagnostics {
        #[command(subcommand)]
        action: DiagnosticsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum DiagnosticsAction {
    /// Soft-deletes Books whose file no longer exists on disk.
    CleanupInvalid,
    /// Prints catalog-wide counters as JSON.
    Query,
}
