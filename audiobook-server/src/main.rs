//! Entry point: parses the CLI, resolves settings, opens the catalog, and
//! dispatches to one of the `scan`/`playlist`/`tag`/`organize`/`serve`/
//! `diagnostics` subcommands, grounded on the teacher's `main.rs`
//! (`ferrex-server/src/main.rs`).

mod cli;
mod dto;
mod errors;
mod handlers;
mod logging;
mod routes;
mod state;
#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use audiobook_config::{
    CliConfig, ConfigLoader, EnvConfig, FileConfig, SecretCipher, Settings, StoredSettings,
};
use audiobook_core::{
    Chain, CoverFetcher, EventHub, HandlerRegistry, OperationQueue, OperationType, Organizer, ScanHandler, Store,
};

use cli::{Cli, Command, DiagnosticsAction};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init()?;

    if let Err(err) = run(cli).await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let file_config = match &cli.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        config_path: cli.config.clone(),
        library_root: cli.dir.clone(),
        db_type: cli.db_type,
        db_path: cli.db.clone(),
        playlists_dir: cli.playlists.clone(),
    };

    // `db_path`/`db_type` must be known before the Store can be opened, so
    // resolve once against an empty StoredSettings to find them, then
    // resolve again once the Store can supply catalog-stored overrides.
    let (bootstrap, _) = ConfigLoader::resolve(
        cli_config.clone(),
        EnvConfig::gather(),
        file_config.clone(),
        StoredSettings::default(),
    );

    let store: Arc<dyn Store> = open_store(&bootstrap).await?;
    let secret_cipher = SecretCipher::load_or_create(&bootstrap.library_root)?;
    let stored = load_stored_settings(store.as_ref(), &secret_cipher).await?;
    let (settings, provenance) =
        ConfigLoader::resolve(cli_config, EnvConfig::gather(), file_config, stored);

    match cli.command {
        Command::Scan => cmd_scan(store, &settings).await,
        Command::Playlist { series, name } => cmd_playlist(store, &settings, series, name).await,
        Command::Tag { path } => cmd_tag(&path),
        Command::Organize { dry_run } => cmd_organize(store, &settings, dry_run).await,
        Command::Serve => cmd_serve(store, settings, provenance).await,
        Command::Diagnostics { action } => cmd_diagnostics(store, action).await,
    }
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    use audiobook_config::DbType;
    std::fs::create_dir_all(&settings.library_root)?;
    match settings.db_type {
        DbType::Sled => {
            info!("opening sled catalog at {}", settings.db_path.display());
            let store = audiobook_core::catalog::kv::SledStore::open(&settings.db_path)?;
            Ok(Arc::new(store))
        }
        DbType::Sqlite => {
            let url = format!("sqlite://{}?mode=rwc", settings.db_path.display());
            info!("opening sqlite catalog at {}", settings.db_path.display());
            let store = audiobook_core::catalog::sql::SqliteStore::connect(&url).await?;
            Ok(Arc::new(store))
        }
    }
}

const SETTINGS_KEYS: &[&str] = &[
    "library_root",
    "db_type",
    "db_path",
    "playlists_dir",
    "organize_template",
    "server_host",
    "server_port",
    "worker_count",
    "openlibrary_base_url",
    "google_books_base_url",
    "audnexus_base_url",
    "userlibrary_bearer_token",
];

async fn load_stored_settings(store: &dyn Store, secret_cipher: &SecretCipher) -> anyhow::Result<StoredSettings> {
    let mut stored = StoredSettings::default();
    for key in SETTINGS_KEYS {
        if let Some(setting) = store.get_setting(key).await? {
            let value = if setting.is_secret {
                secret_cipher.decrypt(&setting.value)?.to_string()
            } else {
                setting.value
            };
            stored.values.insert((*key).to_string(), value);
        }
    }
    Ok(stored)
}

fn build_chain(settings: &Settings) -> Arc<Chain> {
    use audiobook_core::providers::{AudnexusProvider, GoogleBooksProvider, OpenLibraryProvider, UserLibraryGraphProvider};

    let mut providers: Vec<Box<dyn audiobook_core::MetadataSource>> = vec![
        Box::new(OpenLibraryProvider::new(settings.openlibrary_base_url.clone())),
        Box::new(GoogleBooksProvider::new(settings.google_books_base_url.clone())),
        Box::new(AudnexusProvider::new(settings.audnexus_base_url.clone())),
    ];
    if let Some(token) = &settings.userlibrary_bearer_token {
        providers.push(Box::new(UserLibraryGraphProvider::new(
            settings.openlibrary_base_url.clone(),
            token.clone(),
            false,
        )));
    }
    Arc::new(Chain::new(providers))
}

fn build_registry(store: Arc<dyn Store>, hub: Arc<EventHub>, chain: Arc<Chain>, settings: &Settings) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(OperationType::Scan, Arc::new(ScanHandler::new(store.clone(), hub.clone(), Some(chain.clone()))));
    registry.register(
        OperationType::Organize,
        Arc::new(audiobook_core::OrganizeHandler::new(
            store.clone(),
            settings.library_root.clone(),
            AppState::organize_template(settings),
        )),
    );
    registry.register(
        OperationType::BulkFetch,
        Arc::new(audiobook_core::BulkFetchHandler::new(store, hub, chain)),
    );
    registry
}

async fn cmd_scan(store: Arc<dyn Store>, settings: &Settings) -> anyhow::Result<()> {
    let hub = Arc::new(EventHub::new());
    let chain = build_chain(settings);
    let import_paths = store.list_import_paths().await?;
    let import_path = import_paths
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no import paths configured; add one via POST /api/v1/import-paths first"))?;
    let root = std::path::PathBuf::from(&import_path.absolute_path);
    let scanner = audiobook_core::Scanner::new(store, hub, Some(chain), import_path.id.0);
    let summary = scanner.scan(&root, None).await?;
    info!(?summary, "scan complete");
    Ok(())
}

async fn cmd_playlist(
    store: Arc<dyn Store>,
    settings: &Settings,
    series: Option<String>,
    name: String,
) -> anyhow::Result<()> {
    let playlists_dir = settings
        .playlists_dir
        .clone()
        .unwrap_or_else(|| settings.library_root.join("playlists"));
    std::fs::create_dir_all(&playlists_dir)?;

    let mut books = Vec::new();
    let mut offset = 0usize;
    loop {
        let page = store.list_books(200, offset).await?;
        if page.is_empty() {
            break;
        }
        offset += page.len();
        books.extend(page.into_iter().filter(|b| !b.is_deleted()));
    }

    if let Some(series_name) = &series {
        let mut matched = Vec::new();
        for book in books {
            if let Some(series_id) = book.series_id {
                if let Some(s) = store.get_series(&series_id).await? {
                    if s.name.eq_ignore_ascii_case(series_name) {
                        matched.push(book);
                    }
                }
            }
        }
        books = matched;
    }
    books.sort_by(|a, b| {
        a.series_position
            .partial_cmp(&b.series_position)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut contents = String::from("#EXTM3U\n");
    for book in &books {
        contents.push_str(&format!("#EXTINF:-1,{}\n{}\n", book.title, book.current_file_path));
    }
    let out_path = playlists_dir.join(format!("{name}.m3u"));
    std::fs::write(&out_path, contents)?;
    info!("wrote playlist {} ({} tracks)", out_path.display(), books.len());
    Ok(())
}

fn cmd_tag(path: &std::path::Path) -> anyhow::Result<()> {
    let record = audiobook_core::tags::extract_tags(path)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Routes the CLI `organize` subcommand through the same `Organize` operation
/// the HTTP trigger enqueues (`POST /api/v1/operations/organize`), so a run
/// interrupted mid-move leaves a resumable `Interrupted` Operation instead of
/// vanishing with the process (§8 S5).
async fn cmd_organize(store: Arc<dyn Store>, settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    let hub = Arc::new(EventHub::new());
    let mut registry = HandlerRegistry::new();
    registry.register(
        OperationType::Organize,
        Arc::new(audiobook_core::OrganizeHandler::new(
            store.clone(),
            settings.library_root.clone(),
            AppState::organize_template(settings),
        )),
    );
    let queue = OperationQueue::new(store.clone(), hub, registry, 1);
    queue.resume_interrupted().await?;
    queue.spawn_workers();

    let params = audiobook_core::OrganizeParams { dry_run };
    let params_bytes = serde_json::to_vec(&params)?;
    let operation = queue
        .enqueue(OperationType::Organize, audiobook_core::OperationPriority::NORMAL, None, params_bytes)
        .await?;

    loop {
        let op = store.get_operation(&operation.id).await?;
        if op.status.is_terminal() {
            if op.status == audiobook_core::OperationStatus::Failed {
                anyhow::bail!("organize failed: {}", op.error_message.unwrap_or_default());
            }
            info!("organize {status:?}: {message}", status = op.status, message = op.message);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    Ok(())
}

async fn cmd_diagnostics(store: Arc<dyn Store>, action: DiagnosticsAction) -> anyhow::Result<()> {
    match action {
        DiagnosticsAction::CleanupInvalid => {
            let mut offset = 0usize;
            let mut cleaned = 0u64;
            loop {
                let page = store.list_books(200, offset).await?;
                if page.is_empty() {
                    break;
                }
                offset += page.len();
                for book in page {
                    if book.is_deleted() {
                        continue;
                    }
                    if !std::path::Path::new(&book.current_file_path).exists() {
                        store.soft_delete_book(&book.id, chrono::Utc::now()).await?;
                        cleaned += 1;
                    }
                }
            }
            info!("cleaned up {cleaned} books whose file no longer exists");
        }
        DiagnosticsAction::Query => {
            let stats = store.get_dashboard_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

async fn cmd_serve(store: Arc<dyn Store>, settings: Settings, provenance: audiobook_config::Provenance) -> anyhow::Result<()> {
    let hub = Arc::new(EventHub::new());
    let chain = build_chain(&settings);
    let registry = build_registry(store.clone(), hub.clone(), chain.clone(), &settings);
    let queue = OperationQueue::new(store.clone(), hub.clone(), registry, settings.worker_count);
    queue.resume_interrupted().await?;
    queue.spawn_workers();

    let secret_cipher = Arc::new(SecretCipher::load_or_create(&settings.library_root)?);
    let template = AppState::organize_template(&settings);
    let organizer = Arc::new(Organizer::new(store.clone(), settings.library_root.clone(), template));
    let cover_fetcher = Arc::new(CoverFetcher::new(settings.library_root.clone()));

    let server_host = settings.server_host.clone();
    let server_port = settings.server_port;

    let state = AppState {
        store,
        hub,
        queue,
        chain,
        cover_fetcher,
        organizer,
        settings: Arc::new(RwLock::new(settings)),
        provenance: Arc::new(RwLock::new(provenance)),
        secret_cipher,
        started_at: chrono::Utc::now(),
    };

    let router = routes::build_router(state);
    let addr: SocketAddr = format!("{server_host}:{server_port}").parse()?;
    info!("listening on {addr}");
    warn!("no TLS: run behind a reverse proxy for untrusted networks");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
