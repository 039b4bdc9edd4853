//! Request-scoped session context

use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::{AdminSession, ParticipantSession, SessionData};
use crate::AppState;

/// Session resolved from the request cookie
///
/// Extraction never fails: a missing, forged or expired cookie yields an
/// empty context, and each handler decides what that means for its route.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub id: Option<Uuid>,
    pub data: Option<SessionData>,
}

impl SessionContext {
    pub fn admin(&self) -> Option<&AdminSession> {
        self.data.as_ref().and_then(SessionData::as_admin)
    }

    pub fn participant(&self) -> Option<&ParticipantSession> {
        self.data.as_ref().and_then(SessionData::as_participant)
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.as_ref().is_some_and(SessionData::is_authenticated)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SessionContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(id) = state.sessions.session_id_from_headers(&parts.headers) else {
            return Ok(Self::default());
        };

        Ok(match state.sessions.load(id).await {
            Some(data) => Self {
                id: Some(id),
                data: Some(data),
            },
            None => Self::default(),
        })
    }
}
