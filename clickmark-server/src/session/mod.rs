//! Server-side sessions
//!
//! Session data lives in memory, keyed by a random UUID. The browser only
//! holds `<uuid>.<signature>` in the `session` cookie, where the signature is
//! SHA-256 over the secret key and the UUID. Unsigned or unknown cookies are
//! treated as no session.

mod extract;

pub use extract::SessionContext;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use clickmark_common::db::{DemographicsForm, NewDemographics};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

/// Who the session belongs to, fixed at authentication time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionData {
    Admin(AdminSession),
    Participant(ParticipantSession),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminSession {
    pub admin_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSession {
    /// Logged-in participant identity; `None` for anonymous participants
    pub identity_id: Option<i64>,
    pub demographics: DemographicsState,
}

/// Progress of the demographics step within one participant session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DemographicsState {
    /// Form not submitted yet
    Pending,
    /// Form submitted, held here until the task is submitted
    Collected {
        form: DemographicsForm,
        start_time: DateTime<Utc>,
    },
    /// Row already stored
    Persisted { demographics_id: i64 },
}

impl ParticipantSession {
    pub fn anonymous() -> Self {
        Self {
            identity_id: None,
            demographics: DemographicsState::Pending,
        }
    }

    pub fn demographics_completed(&self) -> bool {
        !matches!(self.demographics, DemographicsState::Pending)
    }

    /// Stored demographics row id, once there is one
    pub fn demographics_id(&self) -> Option<i64> {
        match self.demographics {
            DemographicsState::Persisted { demographics_id } => Some(demographics_id),
            _ => None,
        }
    }

    /// Row to insert at submission time, when the form is only in the session
    pub fn pending_demographics(&self) -> Option<NewDemographics> {
        match &self.demographics {
            DemographicsState::Collected { form, start_time } => Some(NewDemographics {
                form: form.clone(),
                start_time: *start_time,
                identity_id: self.identity_id,
            }),
            _ => None,
        }
    }
}

impl SessionData {
    /// True for sessions created by a successful login
    pub fn is_authenticated(&self) -> bool {
        match self {
            SessionData::Admin(_) => true,
            SessionData::Participant(p) => p.identity_id.is_some(),
        }
    }

    pub fn as_admin(&self) -> Option<&AdminSession> {
        match self {
            SessionData::Admin(admin) => Some(admin),
            SessionData::Participant(_) => None,
        }
    }

    pub fn as_participant(&self) -> Option<&ParticipantSession> {
        match self {
            SessionData::Participant(participant) => Some(participant),
            SessionData::Admin(_) => None,
        }
    }
}

/// Default idle time after which a session is dropped
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 2 * 60 * 60;

#[derive(Debug, Clone)]
struct SessionEntry {
    data: SessionData,
    last_seen: DateTime<Utc>,
}

/// In-memory session map plus the cookie signing key
///
/// Entries idle for longer than the timeout are dropped on access and
/// whenever a new session is created.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    secret: Arc<str>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(secret: &str) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            secret: Arc::from(secret),
            idle_timeout: Duration::seconds(DEFAULT_IDLE_TIMEOUT_SECS as i64),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn is_expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        now - entry.last_seen > self.idle_timeout
    }

    /// Start a new session and return its id
    pub async fn create(&self, data: SessionData) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry, now));
        if sessions.len() < before {
            debug!("Dropped {} idle session(s)", before - sessions.len());
        }
        sessions.insert(id, SessionEntry { data, last_seen: now });
        id
    }

    /// Session data, refreshing its idle clock; expired sessions are removed
    pub async fn load(&self, id: Uuid) -> Option<SessionData> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        if self.is_expired(sessions.get(&id)?, now) {
            sessions.remove(&id);
            return None;
        }

        let entry = sessions.get_mut(&id)?;
        entry.last_seen = now;
        Some(entry.data.clone())
    }

    /// Replace the data of a session (or reinstate a taken one)
    pub async fn save(&self, id: Uuid, data: SessionData) {
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                data,
                last_seen: Utc::now(),
            },
        );
    }

    /// Remove a session and return its data
    ///
    /// Of several concurrent callers for the same id only one gets the data.
    pub async fn take(&self, id: Uuid) -> Option<SessionData> {
        let now = Utc::now();
        let entry = self.sessions.write().await.remove(&id)?;
        if self.is_expired(&entry, now) {
            None
        } else {
            Some(entry.data)
        }
    }

    /// Remove a session; returns whether it existed
    pub async fn destroy(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Drop every session idle since before `now - idle_timeout`
    pub async fn purge_idle(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry, now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn sign(&self, id: Uuid) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Signed cookie value for a session id
    pub fn cookie_value(&self, id: Uuid) -> String {
        format!("{}.{}", id, self.sign(id))
    }

    /// `Set-Cookie` header value establishing the session
    pub fn set_cookie_header(&self, id: Uuid) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            self.cookie_value(id)
        )
    }

    /// `Set-Cookie` header value removing the session cookie
    pub fn clear_cookie_header() -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
    }

    /// Verify a cookie value and extract the session id
    pub fn verify_cookie(&self, value: &str) -> Option<Uuid> {
        let (id, signature) = value.split_once('.')?;
        let id = Uuid::parse_str(id).ok()?;
        let matches: bool = self.sign(id).as_bytes().ct_eq(signature.as_bytes()).into();
        matches.then_some(id)
    }

    /// Session id from request headers, if a validly signed cookie is present
    pub fn session_id_from_headers(&self, headers: &HeaderMap) -> Option<Uuid> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == SESSION_COOKIE)
            .find_map(|(_, value)| self.verify_cookie(value))
    }
}
