//! # Clickmark Common Library
//!
//! Shared code for the clickmark server and export binaries:
//! - Data model for identities, demographics and recorded coordinates
//! - Schema initialization and the repository interface over SQLite
//! - Password hashing
//! - Configuration file loading

pub mod config;
pub mod db;
pub mod error;
pub mod password;

pub use error::{Error, Result};
