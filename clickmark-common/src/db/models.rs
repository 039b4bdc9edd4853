//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role stored in `identities.role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Participant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Participant => "participant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "participant" => Some(Role::Participant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioned login
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Participant metadata as entered on the demographics form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicsForm {
    pub participant_id: String,
    pub age: Option<i64>,
    pub gender: String,
    pub education: String,
    pub handedness: String,
    pub ethnicity: String,
}

/// A demographics row that has not been written yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDemographics {
    pub form: DemographicsForm,
    pub start_time: DateTime<Utc>,
    /// Owning participant identity (`None` for anonymous participants)
    pub identity_id: Option<i64>,
}

/// A stored demographics row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Demographics {
    pub id: i64,
    pub form: DemographicsForm,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub identity_id: Option<i64>,
}

/// One click coordinate on one stimulus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateEntry {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub src: Option<String>,
}

/// Reference coordinate recorded by an admin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminLocation {
    pub id: i64,
    pub initial_x: Option<f64>,
    pub initial_y: Option<f64>,
    pub src: Option<String>,
    pub question: Option<String>,
    pub admin_id: i64,
}

/// Coordinate recorded by a participant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserLocation {
    pub id: i64,
    pub final_x: Option<f64>,
    pub final_y: Option<f64>,
    pub src: String,
    pub question: Option<String>,
    pub demographics_id: i64,
}

/// Which demographics row a participant submission attaches to
#[derive(Debug, Clone, PartialEq)]
pub enum DemographicsRef {
    /// Row already stored (account mode); its `end_time` gets stamped
    Existing(i64),
    /// Row held in the session so far (anonymous mode); inserted with the batch
    New(NewDemographics),
}

/// Everything written when a participant finishes the task
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSubmission {
    pub demographics: DemographicsRef,
    pub question: Option<String>,
    pub locations: Vec<CoordinateEntry>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub demographics_id: i64,
    pub locations_written: usize,
}
