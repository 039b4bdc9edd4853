//! Repository interface over the study store
//!
//! Handlers reach the database only through this trait, so the server holds
//! an injected `Arc<dyn StudyRepository>` instead of a global handle.

use async_trait::async_trait;

use super::models::{
    AdminLocation, CoordinateEntry, Demographics, Identity, NewDemographics,
    ParticipantSubmission, Role, SubmissionReceipt, UserLocation,
};
use crate::Result;

#[async_trait]
pub trait StudyRepository: Send + Sync {
    /// Provision a login; returns the new identity id
    async fn insert_identity(&self, username: &str, password_hash: &str, role: Role) -> Result<i64>;

    async fn find_identity_by_username(&self, username: &str) -> Result<Option<Identity>>;

    /// Demographics row owned by an account participant, if any
    async fn find_demographics_for_identity(&self, identity_id: i64) -> Result<Option<Demographics>>;

    async fn insert_demographics(&self, demographics: &NewDemographics) -> Result<i64>;

    /// Append one row per entry, all sharing `question`, in one transaction
    async fn record_admin_locations(
        &self,
        admin_id: i64,
        question: Option<&str>,
        entries: &[CoordinateEntry],
    ) -> Result<usize>;

    /// Write a participant's demographics and coordinates atomically
    async fn submit_participant(&self, submission: &ParticipantSubmission) -> Result<SubmissionReceipt>;

    /// Reference rows, restricted to one admin when `admin_id` is given
    async fn list_admin_locations(&self, admin_id: Option<i64>) -> Result<Vec<AdminLocation>>;

    /// Participant rows, restricted to one demographics row when given
    async fn list_user_locations(&self, demographics_id: Option<i64>) -> Result<Vec<UserLocation>>;
}
