//! SQLite implementation of [`StudyRepository`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::models::{
    AdminLocation, CoordinateEntry, Demographics, DemographicsForm, DemographicsRef, Identity,
    NewDemographics, ParticipantSubmission, Role, SubmissionReceipt, UserLocation,
};
use super::repository::StudyRepository;
use crate::{Error, Result};

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_timestamp(column: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map(|dt| dt.map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn row_to_demographics(row: &SqliteRow) -> Result<Demographics> {
    Ok(Demographics {
        id: row.get("id"),
        form: DemographicsForm {
            participant_id: row.get("participant_id"),
            age: row.get("age"),
            gender: row.get::<Option<String>, _>("gender").unwrap_or_default(),
            education: row.get::<Option<String>, _>("education").unwrap_or_default(),
            handedness: row.get::<Option<String>, _>("handedness").unwrap_or_default(),
            ethnicity: row.get::<Option<String>, _>("ethnicity").unwrap_or_default(),
        },
        start_time: parse_timestamp("start_time", row.get("start_time"))?,
        end_time: parse_timestamp("end_time", row.get("end_time"))?,
        identity_id: row.get("identity_id"),
    })
}

const INSERT_DEMOGRAPHICS: &str = r#"
    INSERT INTO demographics (
        participant_id, age, gender, education, handedness, ethnicity,
        start_time, end_time, identity_id
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl StudyRepository for SqliteRepository {
    async fn insert_identity(&self, username: &str, password_hash: &str, role: Role) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO identities (username, password_hash, role) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_identity_by_username(&self, username: &str) -> Result<Option<Identity>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role FROM identities WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let role: String = row.get("role");
                let role = Role::parse(&role)
                    .ok_or_else(|| Error::Internal(format!("Unknown role '{}'", role)))?;
                Ok(Some(Identity {
                    id: row.get("id"),
                    username: row.get("username"),
                    password_hash: row.get("password_hash"),
                    role,
                }))
            }
            None => Ok(None),
        }
    }

    async fn find_demographics_for_identity(&self, identity_id: i64) -> Result<Option<Demographics>> {
        let row = sqlx::query(
            r#"
            SELECT id, participant_id, age, gender, education, handedness, ethnicity,
                   start_time, end_time, identity_id
            FROM demographics
            WHERE identity_id = ?
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_demographics).transpose()
    }

    async fn insert_demographics(&self, demographics: &NewDemographics) -> Result<i64> {
        let form = &demographics.form;
        let result = sqlx::query(INSERT_DEMOGRAPHICS)
            .bind(&form.participant_id)
            .bind(form.age)
            .bind(&form.gender)
            .bind(&form.education)
            .bind(&form.handedness)
            .bind(&form.ethnicity)
            .bind(demographics.start_time.to_rfc3339())
            .bind(None::<String>)
            .bind(demographics.identity_id)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    async fn record_admin_locations(
        &self,
        admin_id: i64,
        question: Option<&str>,
        entries: &[CoordinateEntry],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO admin_locations (initial_x, initial_y, src, question, admin_id)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.x)
            .bind(entry.y)
            .bind(&entry.src)
            .bind(question)
            .bind(admin_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored {} admin locations for admin {}", entries.len(), admin_id);

        Ok(entries.len())
    }

    async fn submit_participant(&self, submission: &ParticipantSubmission) -> Result<SubmissionReceipt> {
        let finished_at = submission.finished_at.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let demographics_id = match &submission.demographics {
            DemographicsRef::Existing(id) => {
                let result = sqlx::query("UPDATE demographics SET end_time = ? WHERE id = ?")
                    .bind(&finished_at)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                if result.rows_affected() == 0 {
                    // Dropping the transaction rolls back
                    return Err(Error::NotFound(format!("demographics {}", id)));
                }
                *id
            }
            DemographicsRef::New(pending) => {
                let form = &pending.form;
                sqlx::query(INSERT_DEMOGRAPHICS)
                    .bind(&form.participant_id)
                    .bind(form.age)
                    .bind(&form.gender)
                    .bind(&form.education)
                    .bind(&form.handedness)
                    .bind(&form.ethnicity)
                    .bind(pending.start_time.to_rfc3339())
                    .bind(&finished_at)
                    .bind(pending.identity_id)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid()
            }
        };

        for entry in &submission.locations {
            sqlx::query(
                r#"
                INSERT INTO user_locations (final_x, final_y, src, question, demographics_id)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.x)
            .bind(entry.y)
            .bind(&entry.src)
            .bind(&submission.question)
            .bind(demographics_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(SubmissionReceipt {
            demographics_id,
            locations_written: submission.locations.len(),
        })
    }

    async fn list_admin_locations(&self, admin_id: Option<i64>) -> Result<Vec<AdminLocation>> {
        let rows = match admin_id {
            Some(admin_id) => {
                sqlx::query(
                    r#"
                    SELECT id, initial_x, initial_y, src, question, admin_id
                    FROM admin_locations WHERE admin_id = ? ORDER BY id ASC
                    "#,
                )
                .bind(admin_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, initial_x, initial_y, src, question, admin_id
                    FROM admin_locations ORDER BY id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|r| AdminLocation {
                id: r.get("id"),
                initial_x: r.get("initial_x"),
                initial_y: r.get("initial_y"),
                src: r.get("src"),
                question: r.get("question"),
                admin_id: r.get("admin_id"),
            })
            .collect())
    }

    async fn list_user_locations(&self, demographics_id: Option<i64>) -> Result<Vec<UserLocation>> {
        let rows = match demographics_id {
            Some(demographics_id) => {
                sqlx::query(
                    r#"
                    SELECT id, final_x, final_y, src, question, demographics_id
                    FROM user_locations WHERE demographics_id = ? ORDER BY id ASC
                    "#,
                )
                .bind(demographics_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, final_x, final_y, src, question, demographics_id
                    FROM user_locations ORDER BY id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|r| UserLocation {
                id: r.get("id"),
                final_x: r.get("final_x"),
                final_y: r.get("final_y"),
                src: r.get("src"),
                question: r.get("question"),
                demographics_id: r.get("demographics_id"),
            })
            .collect())
    }
}
