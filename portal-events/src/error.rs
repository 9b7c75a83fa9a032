//! Template errors
//!
//! Sync itself only fails on store errors, which surface as
//! `portal_common::Error`. Template shape problems are caught when a
//! template is built or loaded.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("A recurrence template needs at least one weekday")]
    NoWeekdays,

    #[error("Failed to parse template: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
