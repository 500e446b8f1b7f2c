//! Typed settings model (§4.K).

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    #[default]
    Sled,
    Sqlite,
}

pub const DEFAULT_ORGANIZE_TEMPLATE: &str = "{author}/{series} {series_position:02d}/{title}.{format}";
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_OPENLIBRARY_BASE_URL: &str = "https://openlibrary.org";
pub const DEFAULT_GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1";
pub const DEFAULT_AUDNEXUS_BASE_URL: &str = "https://api.audnex.us";

/// The fully resolved configuration a running process operates under,
/// produced by [`crate::loader::ConfigLoader::resolve`].
#[derive(Clone)]
pub struct Settings {
    pub library_root: PathBuf,
    pub db_type: DbType,
    pub db_path: PathBuf,
    pub playlists_dir: Option<PathBuf>,
    pub organize_template: String,
    pub server_host: String,
    pub server_port: u16,
    pub worker_count: usize,
    pub openlibrary_base_url: String,
    pub google_books_base_url: String,
    pub audnexus_base_url: String,
    /// Decrypted at use; masked everywhere else (§4.K "masked in debug
    /// output... last four characters only").
    pub userlibrary_bearer_token: Option<String>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("library_root", &self.library_root)
            .field("db_type", &self.db_type)
            .field("db_path", &self.db_path)
            .field("playlists_dir", &self.playlists_dir)
            .field("organize_template", &self.organize_template)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("worker_count", &self.worker_count)
            .field("openlibrary_base_url", &self.openlibrary_base_url)
            .field("google_books_base_url", &self.google_books_base_url)
            .field("audnexus_base_url", &self.audnexus_base_url)
            .field("userlibrary_bearer_token", &self.userlibrary_bearer_token.as_deref().map(crate::secrets::mask_secret))
            .finish()
    }
}

/// Which precedence layer produced a given field's value (§4.K), surfaced by
/// the `/config` endpoint so the UI can show which layer won.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Cli,
    Env,
    Store,
    Default,
}
