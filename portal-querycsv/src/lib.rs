//! # Portal CSV engine
//!
//! Bulk import and export of schema-described records through flat
//! spreadsheets:
//! - `field_path`: flat key grammar (`name`, `name.sub`, `name[3].sub`)
//! - `flat`: flat ↔ nested record conversion
//! - `schema`: static field tables and the flat column catalogue
//! - `upsert`: create-or-update against a [`store::Store`]
//! - `service` / `job`: batch uploads, templates, downloads and tracked jobs

pub mod error;
pub mod field_path;
pub mod flat;
pub mod job;
pub mod mapping;
pub mod media;
pub mod schema;
pub mod service;
pub mod source;
pub mod store;
pub mod upsert;

pub use error::{ConvertError, FieldErrors, MalformedKeyError, MediaError, RowError, SourceError, UploadError, UpsertError};
pub use field_path::{index_hint, FieldPath};
pub use flat::{flatten, join_list, split_list, unflatten, FlatRecord, NestedRecord};
pub use job::{run_job, UploadJob, UploadStatus};
pub use mapping::{FieldMapping, SKIP};
pub use media::{HttpMediaFetcher, MediaFetcher};
pub use schema::{FieldDescriptor, FieldKind, FieldPolicy, FlatFieldCatalog, ModelSchema, Relation, ValueType};
pub use service::{FailedRow, QueryCsvService, RowSuccess, UploadReport};
pub use source::{read_source, write_csv, Tabular};
pub use store::{Entity, Lookup, MemoryStore, SqliteStore, Store, StoreTransaction};
pub use upsert::{UpsertEngine, UpsertOutcome};
