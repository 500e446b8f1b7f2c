//! Shared test setup, grounded on the teacher's `setup_test_state` pattern
//! (`ferrex-server/src/tests/test_utils.rs`), but backed by `InMemoryStore`
//! instead of a real database connection.

use std::sync::Arc;

use tokio::sync::RwLock;

use audiobook_config::{SecretCipher, Settings};
use audiobook_core::catalog::memory::InMemoryStore;
use audiobook_core::{Chain, CoverFetcher, EventHub, HandlerRegistry, OperationQueue, OrganizeTemplate, Organizer};

use crate::state::AppState;

pub fn test_settings(library_root: std::path::PathBuf) -> Settings {
    Settings {
        library_root: library_root.clone(),
        db_type: audiobook_config::DbType::Sled,
        db_path: library_root.join("catalog.sled"),
        playlists_dir: None,
        organize_template: "{author}/{title}.{format}".into(),
        server_host: "127.0.0.1".into(),
        server_port: 0,
        worker_count: 1,
        openlibrary_base_url: "https://openlibrary.invalid".into(),
        google_books_base_url: "https://googlebooks.invalid".into(),
        audnexus_base_url: "https://audnexus.invalid".into(),
        userlibrary_bearer_token: None,
    }
}

pub async fn setup_test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = test_settings(dir.path().to_path_buf());

    let store: Arc<dyn audiobook_core::Store> = Arc::new(InMemoryStore::new());
    let hub = Arc::new(EventHub::new());
    let chain: Arc<Chain> = Arc::new(Chain::new(Vec::new()));

    let registry = HandlerRegistry::new();
    let queue = OperationQueue::new(store.clone(), hub.clone(), registry, settings.worker_count);

    let secret_cipher = Arc::new(SecretCipher::load_or_create(&settings.library_root).expect("secret cipher"));
    let organizer = Arc::new(Organizer::new(
        store.clone(),
        settings.library_root.clone(),
        OrganizeTemplate::new(settings.organize_template.clone()),
    ));
    let cover_fetcher = Arc::new(CoverFetcher::new(settings.library_root.clone()));

    let state = AppState {
        store,
        hub,
        queue,
        chain,
        cover_fetcher,
        organizer,
        settings: Arc::new(RwLock::new(settings)),
        provenance: Arc::new(RwLock::new(Default::default())),
        secret_cipher,
        started_at: chrono::Utc::now(),
    };
    (state, dir)
}
