//! Precedence resolution across CLI, environment, catalog-stored settings,
//! and compiled defaults (§4.K: "command-line flag > environment variable >
//! catalog-stored setting > compiled default"), returning `(value, source)`
//! pairs the way the teacher's `resolve_effective_database_url_with_source`
//! does.
//!
//! The `--config` TOML file is treated as part of the compiled-default tier
//! (an operator-chosen default, not a runtime-mutable one) rather than as a
//! fifth precedence layer the spec doesn't name; see DESIGN.md.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{
    ConfigSource, DbType, Settings, DEFAULT_AUDNEXUS_BASE_URL, DEFAULT_GOOGLE_BOOKS_BASE_URL,
    DEFAULT_OPENLIBRARY_BASE_URL, DEFAULT_ORGANIZE_TEMPLATE, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
    DEFAULT_WORKER_COUNT,
};
use crate::sources::{parse_db_type, CliConfig, EnvConfig, FileConfig};

/// Per-field provenance, for the `/config` endpoint to report which layer
/// won for each setting.
pub type Provenance = HashMap<&'static str, ConfigSource>;

/// Catalog-stored settings, fetched ahead of time by the caller. Kept as
/// plain strings so this crate never depends on `audiobook-core`'s async
/// `Store` trait.
#[derive(Debug, Default, Clone)]
pub struct StoredSettings {
    pub values: HashMap<String, String>,
}

impl StoredSettings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        cli: CliConfig,
        env: EnvConfig,
        file: Option<FileConfig>,
        stored: StoredSettings,
    ) -> (Settings, Provenance) {
        let mut provenance = Provenance::new();
        let mut put = |field: &'static str, source: ConfigSource| {
            provenance.insert(field, source);
        };

        let (library_root, src) = layered(
            cli.library_root.map(path_to_string),
            env.library_root.map(path_to_string),
            stored.get("library_root").map(str::to_string),
            file.as_ref().and_then(|f| f.library_root.clone()).map(path_to_string).unwrap_or_else(|| ".".into()),
        );
        put("library_root", src);
        let library_root = PathBuf::from(library_root);

        let (db_type, src) = layered_copy(
            cli.db_type,
            env.db_type,
            stored.get("db_type").and_then(parse_db_type),
            file.as_ref().and_then(|f| f.db_type).unwrap_or_default(),
        );
        put("db_type", src);

        let default_db_path = library_root.join(match db_type {
            DbType::Sled => "catalog.sled",
            DbType::Sqlite => "catalog.sqlite",
        });
        let (db_path, src) = layered(
            cli.db_path.map(path_to_string),
            env.db_path.map(path_to_string),
            stored.get("db_path").map(str::to_string),
            file.as_ref().and_then(|f| f.db_path.clone()).map(path_to_string).unwrap_or_else(|| path_to_string(default_db_path)),
        );
        put("db_path", src);

        let (playlists_dir, src) = layered_option(
            cli.playlists_dir.map(path_to_string),
            env.playlists_dir.map(path_to_string),
            stored.get("playlists_dir").map(str::to_string),
            file.as_ref().and_then(|f| f.playlists_dir.clone()).map(path_to_string),
        );
        put("playlists_dir", src);

        let (organize_template, src) = layered(
            None,
            None,
            stored.get("organize_template").map(str::to_string),
            file.as_ref().and_then(|f| f.organize_template.clone()).unwrap_or_else(|| DEFAULT_ORGANIZE_TEMPLATE.into()),
        );
        put("organize_template", src);

        let (server_host, src) = layered(
            None,
            env.server_host,
            stored.get("server_host").map(str::to_string),
            file.as_ref().and_then(|f| f.server_host.clone()).unwrap_or_else(|| DEFAULT_SERVER_HOST.into()),
        );
        put("server_host", src);

        let (server_port, src) = layered_copy(
            None,
            env.server_port,
            stored.get("server_port").and_then(|v| v.parse().ok()),
            file.as_ref().and_then(|f| f.server_port).unwrap_or(DEFAULT_SERVER_PORT),
        );
        put("server_port", src);

        let (worker_count, src) = layered_copy(
            None,
            None,
            stored.get("worker_count").and_then(|v| v.parse().ok()),
            file.as_ref().and_then(|f| f.worker_count).unwrap_or(DEFAULT_WORKER_COUNT),
        );
        put("worker_count", src);

        let (openlibrary_base_url, src) = layered(
            None,
            env.openlibrary_base_url,
            stored.get("openlibrary_base_url").map(str::to_string),
            DEFAULT_OPENLIBRARY_BASE_URL.into(),
        );
        put("openlibrary_base_url", src);

        let (google_books_base_url, src) = layered(
            None,
            env.google_books_base_url,
            stored.get("google_books_base_url").map(str::to_string),
            DEFAULT_GOOGLE_BOOKS_BASE_URL.into(),
        );
        put("google_books_base_url", src);

        let (audnexus_base_url, src) = layered(
            None,
            env.audnexus_base_url,
            stored.get("audnexus_base_url").map(str::to_string),
            DEFAULT_AUDNEXUS_BASE_URL.into(),
        );
        put("audnexus_base_url", src);

        let userlibrary_bearer_token = env.userlibrary_bearer_token.or_else(|| stored.get("userlibrary_bearer_token").map(str::to_string));

        let settings = Settings {
            library_root,
            db_type,
            db_path: PathBuf::from(db_path),
            playlists_dir: playlists_dir.map(PathBuf::from),
            organize_template,
            server_host,
            server_port,
            worker_count,
            openlibrary_base_url,
            google_books_base_url,
            audnexus_base_url,
            userlibrary_bearer_token,
        };

        (settings, provenance)
    }
}

fn path_to_string(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

fn layered(cli: Option<String>, env: Option<String>, stored: Option<String>, default: String) -> (String, ConfigSource) {
    if let Some(v) = cli {
        return (v, ConfigSource::Cli);
    }
    if let Some(v) = env {
        return (v, ConfigSource::Env);
    }
    if let Some(v) = stored {
        return (v, ConfigSource::Store);
    }
    (default, ConfigSource::Default)
}

fn layered_option(
    cli: Option<String>,
    env: Option<String>,
    stored: Option<String>,
    default: Option<String>,
) -> (Option<String>, ConfigSource) {
    if let Some(v) = cli {
        return (Some(v), ConfigSource::Cli);
    }
    if let Some(v) = env {
        return (Some(v), ConfigSource::Env);
    }
    if let Some(v) = stored {
        return (Some(v), ConfigSource::Store);
    }
    (default, ConfigSource::Default)
}

fn layered_copy<T: Copy>(cli: Option<T>, env: Option<T>, stored: Option<T>, default: T) -> (T, ConfigSource) {
    if let Some(v) = cli {
        return (v, ConfigSource::Cli);
    }
    if let Some(v) = env {
        return (v, ConfigSource::Env);
    }
    if let Some(v) = stored {
        return (v, ConfigSource::Store);
    }
    (default, ConfigSource::Default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_beats_env_beats_store_beats_default() {
        let mut stored = StoredSettings::default();
        stored.values.insert("server_port".into(), "9000".into());

        let env = EnvConfig { server_port: Some(9100), ..Default::default() };
        let (settings, provenance) = ConfigLoader::resolve(CliConfig::default(), env, None, stored);
        assert_eq!(settings.server_port, 9100);
        assert_eq!(provenance["server_port"], ConfigSource::Env);
    }

    #[test]
    fn falls_back_to_compiled_default() {
        let (settings, provenance) = ConfigLoader::resolve(CliConfig::default(), EnvConfig::default(), None, StoredSettings::default());
        assert_eq!(settings.server_port, DEFAULT_SERVER_PORT);
        assert_eq!(provenance["server_port"], ConfigSource::Default);
        assert_eq!(settings.organize_template, DEFAULT_ORGANIZE_TEMPLATE);
    }

    #[test]
    fn stored_setting_wins_over_default_but_not_env() {
        let mut stored = StoredSettings::default();
        stored.values.insert("organize_template".into(), "{title}.{format}".into());

        let (settings, provenance) = ConfigLoader::resolve(CliConfig::default(), EnvConfig::default(), None, stored);
        assert_eq!(settings.organize_template, "{title}.{format}");
        assert_eq!(provenance["organize_template"], ConfigSource::Store);
    }
}
