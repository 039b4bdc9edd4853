//! Coordinate recording and lookup

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use clickmark_common::config::ParticipantMode;
use clickmark_common::db::{
    AdminLocation, CoordinateEntry, DemographicsRef, ParticipantSubmission, UserLocation,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::session::{SessionContext, SessionStore};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AdminPoint {
    pub initial_x: Option<f64>,
    pub initial_y: Option<f64>,
    pub src: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminLocationsRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub locations: Vec<AdminPoint>,
}

#[derive(Debug, Deserialize)]
pub struct UserPoint {
    pub final_x: Option<f64>,
    pub final_y: Option<f64>,
    pub src: String,
}

#[derive(Debug, Deserialize)]
pub struct UserLocationsRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub locations: Vec<UserPoint>,
}

#[derive(Debug, Serialize)]
pub struct AdminLocationView {
    pub initial_x: Option<f64>,
    pub initial_y: Option<f64>,
    pub src: Option<String>,
    pub question: Option<String>,
}

impl From<AdminLocation> for AdminLocationView {
    fn from(row: AdminLocation) -> Self {
        Self {
            initial_x: row.initial_x,
            initial_y: row.initial_y,
            src: row.src,
            question: row.question,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserLocationView {
    pub final_x: Option<f64>,
    pub final_y: Option<f64>,
    pub src: String,
}

impl From<UserLocation> for UserLocationView {
    fn from(row: UserLocation) -> Self {
        Self {
            final_x: row.final_x,
            final_y: row.final_y,
            src: row.src,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LocationsResponse<T> {
    pub locations: Vec<T>,
}

/// POST /save_admin_locations
pub async fn save_admin_locations(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(request): Json<AdminLocationsRequest>,
) -> AppResult<Json<Value>> {
    let admin = ctx.admin().ok_or(AppError::SessionExpired)?;

    let entries: Vec<CoordinateEntry> = request
        .locations
        .into_iter()
        .map(|p| CoordinateEntry {
            x: p.initial_x,
            y: p.initial_y,
            src: p.src,
        })
        .collect();

    let written = state
        .repo
        .record_admin_locations(admin.admin_id, request.question.as_deref(), &entries)
        .await?;
    info!("Admin '{}' saved {} reference location(s)", admin.username, written);

    Ok(Json(json!({ "message": "Admin locations saved successfully" })))
}

/// POST /save_user_locations
///
/// Stores the participant's demographics and clicks in one transaction, then
/// ends the session.
pub async fn save_user_locations(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(request): Json<UserLocationsRequest>,
) -> AppResult<Response> {
    let Some(id) = ctx.id else {
        return Err(AppError::SessionExpired);
    };

    // Claim the session before writing so a repeated submit with the same
    // cookie finds nothing to submit
    let Some(session) = state.sessions.take(id).await else {
        return Err(AppError::SessionExpired);
    };
    let Some(participant) = session.as_participant() else {
        state.sessions.save(id, session).await;
        return Err(AppError::SessionExpired);
    };

    let demographics = match (participant.demographics_id(), participant.pending_demographics()) {
        (Some(demographics_id), _) => DemographicsRef::Existing(demographics_id),
        (None, Some(pending)) => DemographicsRef::New(pending),
        (None, None) => {
            state.sessions.save(id, session).await;
            return Err(AppError::SessionExpired);
        }
    };

    let submission = ParticipantSubmission {
        demographics,
        question: request.question,
        locations: request
            .locations
            .into_iter()
            .map(|p| CoordinateEntry {
                x: p.final_x,
                y: p.final_y,
                src: Some(p.src),
            })
            .collect(),
        finished_at: Utc::now(),
    };

    let receipt = match state.repo.submit_participant(&submission).await {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!("Participant submission failed, session kept: {}", e);
            state.sessions.save(id, session).await;
            return Err(e.into());
        }
    };
    info!(
        "Participant submission stored: demographics {}, {} location(s)",
        receipt.demographics_id, receipt.locations_written
    );

    Ok((
        [(SET_COOKIE, SessionStore::clear_cookie_header())],
        Redirect::to("/end"),
    )
        .into_response())
}

/// GET|POST /load_admin_locations
pub async fn load_admin_locations(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> AppResult<Json<LocationsResponse<AdminLocationView>>> {
    let filter = match (ctx.admin(), ctx.data.is_some(), state.mode) {
        (Some(admin), _, _) => Some(admin.admin_id),
        (None, true, _) | (None, false, ParticipantMode::Anonymous) => None,
        (None, false, ParticipantMode::Account) => return Err(AppError::SessionExpired),
    };

    let rows = state.repo.list_admin_locations(filter).await?;
    Ok(Json(LocationsResponse {
        locations: rows.into_iter().map(AdminLocationView::from).collect(),
    }))
}

/// GET /load_user_locations
pub async fn load_user_locations(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> AppResult<Json<LocationsResponse<UserLocationView>>> {
    let rows = if ctx.admin().is_some() {
        state.repo.list_user_locations(None).await?
    } else if let Some(participant) = ctx.participant() {
        match participant.demographics_id() {
            Some(demographics_id) => state.repo.list_user_locations(Some(demographics_id)).await?,
            None => Vec::new(),
        }
    } else {
        return Err(AppError::SessionExpired);
    };

    Ok(Json(LocationsResponse {
        locations: rows.into_iter().map(UserLocationView::from).collect(),
    }))
}

pub fn location_routes() -> Router<AppState> {
    Router::new()
        .route("/save_admin_locations", post(save_admin_locations))
        .route("/save_user_locations", post(save_user_locations))
        .route("/load_admin_locations", get(load_admin_locations).post(load_admin_locations))
        .route("/load_user_locations", get(load_user_locations))
}
