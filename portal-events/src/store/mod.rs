//! Occurrence persistence
//!
//! The recurrence engine only needs these primitives. Collections come back
//! materialized and ordered by start instant.

use crate::occurrence::Occurrence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_common::Result;
use uuid::Uuid;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryOccurrenceStore;
pub use sqlite::SqliteOccurrenceStore;

#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Occurrences owned by a template
    async fn for_template(&self, template_id: Uuid) -> Result<Vec<Occurrence>>;

    async fn get(&self, id: Uuid) -> Result<Option<Occurrence>>;

    /// The template's occurrence at exactly `[start_at, end_at]`
    async fn find_slot(
        &self,
        template_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Option<Occurrence>>;

    /// Whether any occurrence other than `exclude` holds this name and window
    async fn name_taken(
        &self,
        name: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool>;

    async fn create(&self, occurrence: &Occurrence) -> Result<()>;

    /// Replace a stored occurrence; `NotFound` if it is gone
    async fn update(&self, occurrence: &Occurrence) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}
