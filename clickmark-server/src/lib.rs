//! clickmark-server library interface
//!
//! Exposes the router and state so integration tests can drive the service
//! without binding a socket.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;
pub mod ui;
pub mod workflow;

pub use crate::error::{AppError, AppResult};

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use clickmark_common::config::ParticipantMode;
use clickmark_common::db::StudyRepository;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};
use crate::session::SessionStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Study store
    pub repo: Arc<dyn StudyRepository>,
    /// Server-side sessions
    pub sessions: SessionStore,
    /// Participant flow selected at startup
    pub mode: ParticipantMode,
    /// Folder holding uploaded stimuli
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn StudyRepository>,
        sessions: SessionStore,
        mode: ParticipantMode,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            sessions,
            mode,
            upload_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn from_config(repo: Arc<dyn StudyRepository>, config: &ServerConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            ..Self::new(
                repo,
                SessionStore::new(&config.secret_key).with_idle_timeout(
                    chrono::Duration::seconds(config.session_idle_secs as i64),
                ),
                config.mode,
                config.upload_dir.clone(),
            )
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    // `/` is the demographics form for anonymous participants
    let root = match state.mode {
        ParticipantMode::Account => get(api::index),
        ParticipantMode::Anonymous => get(api::demographics_page).post(api::submit_demographics),
    };

    let uploads = Router::new()
        .route("/upload", post(api::upload_files))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    Router::new()
        .route("/", root)
        .merge(api::auth_routes())
        .merge(api::page_routes())
        .merge(api::location_routes())
        .merge(uploads)
        .nest_service("/uploads", ServeDir::new(&state.upload_dir))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
