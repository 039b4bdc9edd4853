//! Participant and admin pages gated by the workflow

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use chrono::Utc;
use clickmark_common::config::ParticipantMode;
use clickmark_common::db::{DemographicsForm, NewDemographics};
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::session::{DemographicsState, ParticipantSession, SessionContext, SessionData};
use crate::workflow::{gate, Gate, Page};
use crate::{ui, AppState};

/// Raw demographics form fields
#[derive(Debug, Deserialize)]
pub struct DemographicsInput {
    pub participant_id: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub handedness: String,
    #[serde(default)]
    pub ethnicity: String,
}

impl DemographicsInput {
    /// Validate into the stored form; a blank age is stored as NULL
    pub fn into_form(self) -> AppResult<DemographicsForm> {
        let participant_id = self.participant_id.trim().to_string();
        if participant_id.is_empty() {
            return Err(AppError::InvalidInput("participant_id is required".to_string()));
        }

        let age = match self.age.trim() {
            "" => None,
            value => Some(
                value
                    .parse::<i64>()
                    .map_err(|_| AppError::InvalidInput(format!("age '{}' is not a number", value)))?,
            ),
        };

        Ok(DemographicsForm {
            participant_id,
            age,
            gender: self.gender,
            education: self.education,
            handedness: self.handedness,
            ethnicity: self.ethnicity,
        })
    }
}

/// Render `page` if the session may see it, otherwise redirect
fn gated(state: &AppState, ctx: &SessionContext, page: Page, render: impl FnOnce() -> Html<String>) -> Response {
    match gate(state.mode, ctx.data.as_ref(), page) {
        Gate::Allow => render().into_response(),
        Gate::Redirect(to) => Redirect::to(to).into_response(),
    }
}

/// Move on to the page after `page` if the session may leave it
fn advance(state: &AppState, ctx: &SessionContext, page: Page) -> Response {
    match gate(state.mode, ctx.data.as_ref(), page) {
        Gate::Allow => {
            let next = page.next().unwrap_or(page);
            Redirect::to(next.path(state.mode)).into_response()
        }
        Gate::Redirect(to) => Redirect::to(to).into_response(),
    }
}

/// GET / (account mode)
pub async fn index() -> Redirect {
    Redirect::to("/login")
}

/// GET /admin
pub async fn admin_page(State(state): State<AppState>, ctx: SessionContext) -> Response {
    gated(&state, &ctx, Page::AdminHome, ui::admin)
}

/// GET /user
pub async fn task_page(State(state): State<AppState>, ctx: SessionContext) -> Response {
    gated(&state, &ctx, Page::Task, ui::task)
}

/// GET /demographics (and / in anonymous mode)
pub async fn demographics_page(State(state): State<AppState>, ctx: SessionContext) -> Response {
    let action = state.mode.demographics_path();
    gated(&state, &ctx, Page::Demographics, || ui::demographics(action))
}

/// POST /demographics (and / in anonymous mode)
///
/// Account participants get their row stored right away. Anonymous
/// participants get a new session holding the form until submission.
pub async fn submit_demographics(
    State(state): State<AppState>,
    ctx: SessionContext,
    Form(input): Form<DemographicsInput>,
) -> AppResult<Response> {
    if let Gate::Redirect(to) = gate(state.mode, ctx.data.as_ref(), Page::Demographics) {
        return Ok(Redirect::to(to).into_response());
    }

    let form = input.into_form()?;
    let start_time = Utc::now();
    let next = Page::Instructions.path(state.mode);

    match (ctx.id, ctx.data) {
        (Some(id), Some(SessionData::Participant(mut participant))) => {
            participant.demographics = match state.mode {
                ParticipantMode::Account => {
                    let demographics_id = state
                        .repo
                        .insert_demographics(&NewDemographics {
                            form,
                            start_time,
                            identity_id: participant.identity_id,
                        })
                        .await?;
                    info!("Stored demographics {} for identity {:?}", demographics_id, participant.identity_id);
                    DemographicsState::Persisted { demographics_id }
                }
                ParticipantMode::Anonymous => DemographicsState::Collected { form, start_time },
            };
            state.sessions.save(id, SessionData::Participant(participant)).await;

            Ok(Redirect::to(next).into_response())
        }
        _ => {
            // Only reachable in anonymous mode: the gate sends everyone
            // without a participant session elsewhere in account mode
            let participant = ParticipantSession {
                demographics: DemographicsState::Collected { form, start_time },
                ..ParticipantSession::anonymous()
            };
            let id = state.sessions.create(SessionData::Participant(participant)).await;
            info!("Started anonymous participant session");

            Ok((
                [(SET_COOKIE, state.sessions.set_cookie_header(id))],
                Redirect::to(next),
            )
                .into_response())
        }
    }
}

/// GET /instructions
pub async fn instructions_page(State(state): State<AppState>, ctx: SessionContext) -> Response {
    gated(&state, &ctx, Page::Instructions, ui::instructions)
}

/// POST /instructions
pub async fn instructions_next(State(state): State<AppState>, ctx: SessionContext) -> Response {
    advance(&state, &ctx, Page::Instructions)
}

/// GET /instructions2
pub async fn instructions2_page(State(state): State<AppState>, ctx: SessionContext) -> Response {
    gated(&state, &ctx, Page::Instructions2, ui::instructions2)
}

/// POST /instructions2
pub async fn instructions2_next(State(state): State<AppState>, ctx: SessionContext) -> Response {
    advance(&state, &ctx, Page::Instructions2)
}

/// GET /end
pub async fn end_page() -> Html<String> {
    ui::end()
}

pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(admin_page))
        .route("/user", get(task_page))
        .route("/demographics", get(demographics_page).post(submit_demographics))
        .route("/instructions", get(instructions_page).post(instructions_next))
        .route("/instructions2", get(instructions2_page).post(instructions2_next))
        .route("/end", get(end_page))
}
