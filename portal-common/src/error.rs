//! Shared error type for the portal engines
//!
//! Row-level upload failures and template validation have their own enums in
//! portal-querycsv and portal-events; this one covers storage and setup.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON document (entity fields, host lists) failed to encode or decode
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity or occurrence id with no stored row
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record with the same identifying fields is already stored
    #[error("Already exists: {0}")]
    Conflict(String),

    /// Stored data that cannot be read back (bad id, timestamp or enum text)
    #[error("Corrupt record: {0}")]
    Internal(String),
}
