//! Database models, schema and repository

pub mod init;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use init::*;
pub use models::*;
pub use repository::StudyRepository;
pub use sqlite::SqliteRepository;
