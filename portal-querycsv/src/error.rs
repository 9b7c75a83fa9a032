//! Error types for the CSV engine
//!
//! Errors fall in two groups. Row errors ([`RowError`]) reject one record and
//! are collected into the upload report; the batch keeps going. Batch errors
//! ([`UploadError`]) abort the whole upload and reach the caller.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Field-keyed validation messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// A flat key or column header that does not follow the key grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedKeyError {
    #[error("malformed field key '{key}': {reason}")]
    Grammar { key: String, reason: &'static str },

    #[error("column '{key}' contains {count} numbers, list columns may contain at most one")]
    AmbiguousIndex { key: String, count: usize },
}

/// Flat record could not be mapped onto the schema's shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error(transparent)]
    MalformedKey(#[from] MalformedKeyError),

    #[error("field '{key}' is not a nested object")]
    NotNested { key: String },

    #[error("field '{key}' is not a list of nested objects")]
    NotManyNested { key: String },

    #[error("list index in '{key}' is above the maximum of {max}")]
    IndexOutOfRange { key: String, max: usize },
}

impl ConvertError {
    /// Key the error is reported under
    pub fn key(&self) -> &str {
        match self {
            Self::MalformedKey(MalformedKeyError::Grammar { key, .. })
            | Self::MalformedKey(MalformedKeyError::AmbiguousIndex { key, .. })
            | Self::NotNested { key }
            | Self::NotManyNested { key }
            | Self::IndexOutOfRange { key, .. } => key,
        }
    }

    pub fn into_field_errors(self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.insert(self.key().to_string(), vec![self.to_string()]);
        errors
    }
}

/// Remote media download failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("Enter a valid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Expected url {url} to return 2xx/3xx, but returned {status} after {attempts} attempts")]
    Status { url: String, status: u16, attempts: u32 },

    #[error("Request to {url} failed after {attempts} attempts: {reason}")]
    Request {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Url {url} did not return an image (detected {detected})")]
    NotAnImage { url: String, detected: String },

    #[error("Could not store media from {url}: {reason}")]
    Storage { url: String, reason: String },
}

/// Why a single row was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("unique fields {fields:?} match {} different records", entity_ids.len())]
    ConflictingUniqueKey {
        fields: Vec<String>,
        entity_ids: Vec<Uuid>,
    },

    #[error("validation failed: {}", summarize(.0))]
    FieldValidation(FieldErrors),

    #[error("field '{field}': {source}")]
    RemoteMediaFetch {
        field: String,
        #[source]
        source: MediaError,
    },
}

impl RowError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::FieldValidation(errors)
    }

    /// Per-field view of the error for upload reports
    pub fn field_errors(&self) -> FieldErrors {
        match self {
            Self::FieldValidation(errors) => errors.clone(),
            Self::ConflictingUniqueKey { fields, .. } => fields
                .iter()
                .map(|f| (f.clone(), vec![self.to_string()]))
                .collect(),
            Self::RemoteMediaFetch { field, source } => {
                let mut errors = FieldErrors::new();
                errors.insert(field.clone(), vec![source.to_string()]);
                errors
            }
        }
    }

    /// Short machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConflictingUniqueKey { .. } => "ConflictingUniqueKeyError",
            Self::FieldValidation(_) => "FieldValidationError",
            Self::RemoteMediaFetch { .. } => "RemoteMediaFetchError",
        }
    }
}

impl Serialize for RowError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("RowError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("fields", &self.field_errors())?;
        state.end()
    }
}

fn summarize(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of one engine call: either the row is rejected or the store failed
#[derive(Debug, Error)]
pub enum UpsertError {
    #[error(transparent)]
    Row(#[from] RowError),

    #[error(transparent)]
    Store(#[from] portal_common::Error),
}

/// Source file could not be read into rows
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON source must be an array of objects")]
    JsonShape,

    #[error("spreadsheet has no worksheets")]
    EmptyWorkbook,
}

/// Batch-fatal upload failure
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not parse source file: {0}")]
    Source(#[from] SourceError),

    #[error("invalid column mapping: {0}")]
    Mapping(#[from] MalformedKeyError),

    #[error("store failure: {0}")]
    Store(#[from] portal_common::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_field_errors_name_every_field() {
        let err = RowError::ConflictingUniqueKey {
            fields: vec!["name".into(), "alias".into()],
            entity_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        let errors = err.field_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors["name"][0].contains("2 different records"));
    }

    #[test]
    fn test_row_error_serializes_kind_and_fields() {
        let err = RowError::field("name", "This field is required.");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "FieldValidationError");
        assert_eq!(json["fields"]["name"][0], "This field is required.");
    }

    #[test]
    fn test_media_error_mentions_url_and_status() {
        let err = RowError::RemoteMediaFetch {
            field: "logo".into(),
            source: MediaError::Status {
                url: "https://example.com/a.png".into(),
                status: 404,
                attempts: 3,
            },
        };
        let message = err.field_errors()["logo"][0].clone();
        assert!(message.contains("https://example.com/a.png"));
        assert!(message.contains("404"));
    }
}
