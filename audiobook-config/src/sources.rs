//! Raw configuration layers prior to precedence resolution (§4.K), mirroring
//! the teacher's `FileConfig`/`EnvConfig` split in `ferrex-config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::DbType;

/// On-disk TOML config file, pointed to by `--config`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub library_root: Option<PathBuf>,
    #[serde(default)]
    pub db_type: Option<DbType>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub playlists_dir: Option<PathBuf>,
    #[serde(default)]
    pub organize_template: Option<String>,
    #[serde(default)]
    pub server_host: Option<String>,
    #[serde(default)]
    pub server_port: Option<u16>,
    #[serde(default)]
    pub worker_count: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// Environment-derived overrides (§6 "Environment variables" — provider base
/// URLs take precedence over the stored setting but not over the CLI flag).
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub library_root: Option<PathBuf>,
    pub db_type: Option<DbType>,
    pub db_path: Option<PathBuf>,
    pub playlists_dir: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub openlibrary_base_url: Option<String>,
    pub google_books_base_url: Option<String>,
    pub audnexus_base_url: Option<String>,
    pub userlibrary_bearer_token: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            library_root: std::env::var("AUDIOBOOK_LIBRARY_ROOT").ok().map(PathBuf::from),
            db_type: std::env::var("AUDIOBOOK_DB_TYPE").ok().and_then(|s| parse_db_type(&s)),
            db_path: std::env::var("AUDIOBOOK_DB_PATH").ok().map(PathBuf::from),
            playlists_dir: std::env::var("AUDIOBOOK_PLAYLISTS_DIR").ok().map(PathBuf::from),
            server_host: std::env::var("SERVER_HOST").ok(),
            server_port: std::env::var("SERVER_PORT").ok().and_then(|s| s.parse().ok()),
            openlibrary_base_url: std::env::var("OPENLIBRARY_BASE_URL").ok(),
            google_books_base_url: std::env::var("GOOGLE_BOOKS_BASE_URL").ok(),
            audnexus_base_url: std::env::var("AUDNEXUS_BASE_URL").ok(),
            userlibrary_bearer_token: std::env::var("USERLIBRARY_BEARER_TOKEN").ok(),
        }
    }
}

/// CLI-derived overrides. `audiobook-server`'s `clap::Parser` struct (global
/// flags `--config`/`--dir`/`--db`/`--db-type`/`--playlists`) is converted
/// into this rather than deriving a `Parser` here, so this crate stays
/// binary-agnostic.
#[derive(Debug, Default, Clone)]
pub struct CliConfig {
    pub config_path: Option<PathBuf>,
    pub library_root: Option<PathBuf>,
    pub db_type: Option<DbType>,
    pub db_path: Option<PathBuf>,
    pub playlists_dir: Option<PathBuf>,
}

pub(crate) fn parse_db_type(s: &str) -> Option<DbType> {
    match s.to_lowercase().as_str() {
        "sled" => Some(DbType::Sled),
        "sqlite" => Some(DbType::Sqlite),
        _ => None,
    }
}
