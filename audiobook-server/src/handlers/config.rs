//! Config handlers (§6 "Config"). Writes persist to the Catalog Store as
//! `Setting` rows so they win over compiled defaults on the next process
//! start (§4.K precedence: catalog-stored setting still loses to env/CLI).

use axum::extract::State;
use axum::Json;

use audiobook_core::Setting;

use crate::dto::{ApiResponse, ConfigResponse, ConfigUpdateRequest};
use crate::errors::ApiResult;
use crate::state::AppState;

pub async fn get_config(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<ConfigResponse>>> {
    let settings = state.settings.read().await;
    let provenance = state.provenance.read().await;
    Ok(ApiResponse::ok(to_response(&settings, &provenance)))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(req): Json<ConfigUpdateRequest>,
) -> ApiResult<Json<ApiResponse<ConfigResponse>>> {
    let mut settings = state.settings.write().await;

    if let Some(v) = req.organize_template {
        put_setting(&state, "organize_template", &v, false).await?;
        settings.organize_template = v;
    }
    if let Some(v) = req.worker_count {
        put_setting(&state, "worker_count", &v.to_string(), false).await?;
        settings.worker_count = v;
    }
    if let Some(v) = req.openlibrary_base_url {
        put_setting(&state, "openlibrary_base_url", &v, false).await?;
        settings.openlibrary_base_url = v;
    }
    if let Some(v) = req.google_books_base_url {
        put_setting(&state, "google_books_base_url", &v, false).await?;
        settings.google_books_base_url = v;
    }
    if let Some(v) = req.audnexus_base_url {
        put_setting(&state, "audnexus_base_url", &v, false).await?;
        settings.audnexus_base_url = v;
    }
    if let Some(v) = req.userlibrary_bearer_token {
        let encrypted = state.secret_cipher.encrypt(&v)?;
        put_setting(&state, "userlibrary_bearer_token", &encrypted, true).await?;
        settings.userlibrary_bearer_token = Some(v);
    }

    state.hub.publish(audiobook_core::Event::ConfigChanged { key: "config".into() });

    let provenance = state.provenance.read().await;
    Ok(ApiResponse::ok(to_response(&settings, &provenance)))
}

async fn put_setting(state: &AppState, key: &str, value: &str, is_secret: bool) -> ApiResult<()> {
    state
        .store
        .put_setting(Setting {
            key: key.to_string(),
            value: value.to_string(),
            type_tag: "string".into(),
            is_secret,
        })
        .await?;
    Ok(())
}

fn to_response(
    settings: &audiobook_config::Settings,
    provenance: &audiobook_config::Provenance,
) -> ConfigResponse {
    ConfigResponse {
        library_root: settings.library_root.to_string_lossy().into_owned(),
        db_type: format!("{:?}", settings.db_type).to_lowercase(),
        server_host: settings.server_host.clone(),
        server_port: settings.server_port,
        worker_count: settings.worker_count,
        organize_template: settings.organize_template.clone(),
        openlibrary_base_url: settings.openlibrary_base_url.clone(),
        google_books_base_url: settings.google_books_base_url.clone(),
        audnexus_base_url: settings.audnexus_base_url.clone(),
        userlibrary_bearer_token: settings.userlibrary_bearer_token.as_deref().map(audiobook_config::mask_secret),
        provenance: provenance.iter().map(|(k, v)| (k.to_string(), format!("{v:?}").to_lowercase())).collect(),
    }
}
