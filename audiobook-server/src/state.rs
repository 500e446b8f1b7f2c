//! Shared application state, grounded on the teacher's layered `AppState`
//! (`ferrex-server/src/infra/app_state.rs`): one `Arc`-wrapped handle per
//! subsystem, cloned cheaply into every handler via axum's `State` extractor.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use audiobook_config::{Provenance, SecretCipher, Settings};
use audiobook_core::{Chain, CoverFetcher, EventHub, OperationQueue, OrganizeTemplate, Organizer, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub hub: Arc<EventHub>,
    pub queue: Arc<OperationQueue>,
    pub chain: Arc<Chain>,
    pub cover_fetcher: Arc<CoverFetcher>,
    pub organizer: Arc<Organizer>,
    pub settings: Arc<RwLock<Settings>>,
    pub provenance: Arc<RwLock<Provenance>>,
    pub secret_cipher: Arc<SecretCipher>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn organize_template(settings: &Settings) -> OrganizeTemplate {
        OrganizeTemplate::new(settings.organize_template.clone())
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
