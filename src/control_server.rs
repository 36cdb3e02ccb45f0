//! Local control-plane HTTP server.
//!
//! Serves the configuration API used by the web settings page, a few
//! read-only status endpoints, and the built web assets with a single-page-app
//! fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info, warn};

use crate::config::{ConfigPatch, ConfigStore, Configuration};
use crate::error_codes::{
    ERR_CONFIG_INVALID, ERR_CREDENTIAL_MISSING, ERR_REMOTE_AUTH, ERR_REMOTE_UNAVAILABLE,
    ERR_SUPERVISOR_FAILED,
};
use crate::logging::{ActivityEntry, ActivityLog};
use crate::remote::RemoteError;
use crate::supervisor::SyncSupervisor;
use crate::sync_engine::EngineStatus;

const DEFAULT_LOG_PAGE: usize = 100;

pub struct ControlState {
    pub store: Arc<ConfigStore>,
    pub supervisor: Arc<SyncSupervisor>,
    pub activity: Arc<ActivityLog>,
}

type SharedState = Arc<ControlState>;

/// Error body: `{"code": ERR_*, "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ERR_CONFIG_INVALID, message)
    }
}

impl From<RemoteError> for ApiError {
    fn from(e: RemoteError) -> Self {
        if e.is_auth() {
            Self::new(StatusCode::UNAUTHORIZED, ERR_REMOTE_AUTH, e.to_string())
        } else {
            Self::new(StatusCode::BAD_GATEWAY, ERR_REMOTE_UNAVAILABLE, e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "code": self.code, "message": self.message })),
        )
            .into_response()
    }
}

/// The `/api` routes, open to every origin.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/albums", get(albums))
        .route("/api/sync", post(sync_now))
        .route("/api/logs", get(logs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes plus the web UI. Unknown paths get `index.html` so client-side
/// routing works.
pub fn router(state: SharedState, web_dir: Option<&Path>) -> Router {
    let api = api_router(state);
    match web_dir {
        Some(web_dir) => {
            let spa_fallback =
                ServeDir::new(web_dir).fallback(ServeFile::new(web_dir.join("index.html")));
            api.fallback_service(spa_fallback)
        }
        None => api,
    }
}

/// The web directory to serve, if it holds a built app. Without one the
/// control server isn't started; tray and sync keep running.
pub fn resolve_web_dir(web_dir: &Path) -> Option<PathBuf> {
    if web_dir.join("index.html").is_file() {
        Some(web_dir.to_path_buf())
    } else {
        error!(
            "web assets not found at {}; control server disabled",
            web_dir.display()
        );
        None
    }
}

/// Run until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("control server listening on http://{addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn get_config(State(state): State<SharedState>) -> Json<Configuration> {
    Json((*state.store.get()).clone())
}

async fn update_config(
    State(state): State<SharedState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Configuration>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::invalid(e.body_text()))?;
    let patch = ConfigPatch::from_value(body).map_err(|e| ApiError::invalid(e.to_string()))?;
    patch.validate().map_err(|e| ApiError::invalid(e.to_string()))?;

    if patch.is_empty() {
        return Ok(Json((*state.store.get()).clone()));
    }

    let merged = state.store.update(|config| patch.apply(config));
    if state.store.is_dirty() {
        warn!("configuration updated in memory only; save failed");
    }
    info!("configuration updated via control plane");

    let supervisor = Arc::clone(&state.supervisor);
    match tokio::task::spawn_blocking(move || supervisor.restart()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("{e}"),
        Err(e) => warn!("restart task failed: {e}"),
    }

    Ok(Json((*merged).clone()))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "running", "mode": "desktop" }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    running: bool,
    #[serde(flatten)]
    engine: EngineStatus,
}

async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.supervisor.is_running(),
        engine: state.supervisor.engine().status(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlbumEntry {
    id: String,
    title: String,
    item_count: u64,
    selected: bool,
}

async fn albums(State(state): State<SharedState>) -> Result<Json<Vec<AlbumEntry>>, ApiError> {
    let config = state.store.get();
    let credential = config.credential().ok_or_else(|| {
        ApiError::new(StatusCode::BAD_REQUEST, ERR_CREDENTIAL_MISSING, "no API key configured")
    })?;

    let albums = state
        .supervisor
        .engine()
        .client()
        .list_albums(credential)
        .await?;

    Ok(Json(
        albums
            .into_iter()
            .map(|album| AlbumEntry {
                selected: config.is_selected(&album.title),
                id: album.id,
                title: album.title,
                item_count: album.item_count,
            })
            .collect(),
    ))
}

async fn sync_now(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let supervisor = Arc::clone(&state.supervisor);
    let generation = tokio::task::spawn_blocking(move || supervisor.sync_now())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, ERR_SUPERVISOR_FAILED, e.to_string()))?
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, ERR_SUPERVISOR_FAILED, e.to_string()))?;

    Ok(Json(json!({ "generation": generation })))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    album: Option<String>,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

async fn logs(State(state): State<SharedState>, Query(query): Query<LogQuery>) -> Json<Vec<ActivityEntry>> {
    Json(state.activity.entries_paginated(
        query.album.as_deref(),
        query.offset,
        query.limit.unwrap_or(DEFAULT_LOG_PAGE),
    ))
}
