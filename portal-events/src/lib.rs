//! # Portal recurrence engine
//!
//! Materializes weekly recurrence templates into dated occurrences:
//! - `dates`: weekday arithmetic
//! - `template`: recurrence templates and their occurrence windows
//! - `occurrence`: concrete dated instances
//! - `store`: occurrence persistence (memory and SQLite)
//! - `recurrence`: the sync pass reconciling a template with its occurrences

pub mod dates;
pub mod error;
pub mod occurrence;
pub mod recurrence;
pub mod store;
pub mod template;

pub use dates::{day_count, DayType};
pub use error::TemplateError;
pub use occurrence::{EventType, Occurrence, OccurrenceStatus};
pub use recurrence::{RecurrenceEngine, SyncOutcome};
pub use store::{MemoryOccurrenceStore, OccurrenceStore, SqliteOccurrenceStore};
pub use template::RecurrenceTemplate;
