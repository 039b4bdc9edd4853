//! Credential check behind `POST /login`

use clickmark_common::db::{Role, StudyRepository};
use clickmark_common::password::verify_password;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::session::{AdminSession, DemographicsState, ParticipantSession, SessionData};

/// Validate a username/password pair and build the session it grants
///
/// Unknown usernames and wrong passwords fail identically with
/// [`AppError::InvalidCredentials`].
pub async fn authenticate(
    repo: &dyn StudyRepository,
    username: &str,
    password: &str,
) -> AppResult<SessionData> {
    let identity = match repo.find_identity_by_username(username).await? {
        Some(identity) if verify_password(password, &identity.password_hash) => identity,
        _ => return Err(AppError::InvalidCredentials),
    };

    match identity.role {
        Role::Admin => Ok(SessionData::Admin(AdminSession {
            admin_id: identity.id,
            username: identity.username,
        })),
        Role::Participant => {
            let demographics = match repo.find_demographics_for_identity(identity.id).await? {
                Some(row) => {
                    debug!("Participant {} already has demographics {}", identity.id, row.id);
                    DemographicsState::Persisted { demographics_id: row.id }
                }
                None => DemographicsState::Pending,
            };

            Ok(SessionData::Participant(ParticipantSession {
                identity_id: Some(identity.id),
                demographics,
            }))
        }
    }
}
