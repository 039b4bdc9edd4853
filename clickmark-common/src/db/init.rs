//! Database initialization
//!
//! Opens (creating if needed) the single-file study database and creates the
//! four study tables. Table creation is idempotent, so this runs on every
//! server start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Tables created by [`init_database`], in creation order
pub const STUDY_TABLES: [&str; 4] = ["identities", "demographics", "admin_locations", "user_locations"];

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Foreign keys are a per-connection setting in SQLite, so they are set in
    // the connect options rather than with a one-off PRAGMA.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all study tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_identities_table(pool).await?;
    create_demographics_table(pool).await?;
    create_admin_locations_table(pool).await?;
    create_user_locations_table(pool).await?;
    Ok(())
}

async fn create_identities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identities (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('admin', 'participant')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_demographics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS demographics (
            id INTEGER PRIMARY KEY,
            participant_id TEXT NOT NULL,
            age INTEGER,
            gender TEXT,
            education TEXT,
            handedness TEXT,
            ethnicity TEXT,
            start_time TEXT,
            end_time TEXT,
            identity_id INTEGER REFERENCES identities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_demographics_identity ON demographics(identity_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_admin_locations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS admin_locations (
            id INTEGER PRIMARY KEY,
            initial_x REAL,
            initial_y REAL,
            src TEXT,
            question TEXT,
            admin_id INTEGER NOT NULL REFERENCES identities(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_locations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_locations (
            id INTEGER PRIMARY KEY,
            final_x REAL,
            final_y REAL,
            src TEXT NOT NULL,
            question TEXT,
            demographics_id INTEGER NOT NULL REFERENCES demographics(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_locations_demographics ON user_locations(demographics_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
