//! Login and logout

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::session::{SessionContext, SessionStore};
use crate::{auth, ui, workflow, AppState};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// GET /login
pub async fn login_page() -> Html<String> {
    ui::login()
}

/// POST /login
///
/// On success any previous session of this browser is replaced by a fresh
/// one. On failure nothing about the session changes.
pub async fn login(
    State(state): State<AppState>,
    ctx: SessionContext,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let session = match auth::authenticate(state.repo.as_ref(), &form.username, &form.password).await {
        Ok(session) => session,
        Err(AppError::InvalidCredentials) => {
            warn!("Failed login for '{}'", form.username);
            return Err(AppError::InvalidCredentials);
        }
        Err(e) => return Err(e),
    };

    if let Some(previous) = ctx.id {
        state.sessions.destroy(previous).await;
    }

    let landing = workflow::after_login(&session);
    let id = state.sessions.create(session).await;
    info!("'{}' logged in, redirecting to {}", form.username, landing);

    Ok((
        [(SET_COOKIE, state.sessions.set_cookie_header(id))],
        Redirect::to(landing),
    )
        .into_response())
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, ctx: SessionContext) -> Response {
    if let Some(id) = ctx.id {
        state.sessions.destroy(id).await;
    }

    (
        [(SET_COOKIE, SessionStore::clear_cookie_header())],
        Redirect::to("/login"),
    )
        .into_response()
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}
