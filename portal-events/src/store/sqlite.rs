//! SQLite occurrence store
//!
//! One row per occurrence in the `occurrences` table. Instants are stored as
//! RFC 3339 UTC strings so slot lookups compare text. Host and attachment
//! lists are JSON arrays.

use super::OccurrenceStore;
use crate::occurrence::Occurrence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const COLUMNS: &str = "id, template_id, name, start_at, end_at, location, description, event_type, \
                       is_public, primary_host, secondary_hosts, attachments, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SqliteOccurrenceStore {
    pool: SqlitePool,
}

impl SqliteOccurrenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("bad occurrence id {}: {}", value, e)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {}: {}", value, e)))
}

fn occurrence_from_row(row: &SqliteRow) -> Result<Occurrence> {
    let template_id: Option<String> = row.get("template_id");
    let event_type: String = row.get("event_type");
    let secondary_hosts: String = row.get("secondary_hosts");
    let attachments: String = row.get("attachments");

    Ok(Occurrence {
        id: parse_uuid(row.get("id"))?,
        template_id: template_id.as_deref().map(parse_uuid).transpose()?,
        name: row.get("name"),
        start_at: parse_timestamp(row.get("start_at"))?,
        end_at: parse_timestamp(row.get("end_at"))?,
        location: row.get("location"),
        description: row.get("description"),
        event_type: event_type.parse().map_err(Error::Internal)?,
        is_public: row.get("is_public"),
        primary_host: row.get("primary_host"),
        secondary_hosts: serde_json::from_str(&secondary_hosts)?,
        attachments: serde_json::from_str(&attachments)?,
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

#[async_trait]
impl OccurrenceStore for SqliteOccurrenceStore {
    async fn for_template(&self, template_id: Uuid) -> Result<Vec<Occurrence>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM occurrences WHERE template_id = ? ORDER BY start_at",
            COLUMNS
        ))
        .bind(template_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(occurrence_from_row).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Occurrence>> {
        let row = sqlx::query(&format!("SELECT {} FROM occurrences WHERE id = ?", COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(occurrence_from_row).transpose()
    }

    async fn find_slot(
        &self,
        template_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Option<Occurrence>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM occurrences WHERE template_id = ? AND start_at = ? AND end_at = ?",
            COLUMNS
        ))
        .bind(template_id.to_string())
        .bind(start_at.to_rfc3339())
        .bind(end_at.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(occurrence_from_row).transpose()
    }

    async fn name_taken(
        &self,
        name: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM occurrences WHERE name = ? AND start_at = ? AND end_at = ? AND id != ?",
        )
        .bind(name)
        .bind(start_at.to_rfc3339())
        .bind(end_at.to_rfc3339())
        .bind(exclude.map(|id| id.to_string()).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn create(&self, occurrence: &Occurrence) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO occurrences ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            COLUMNS
        ))
        .bind(occurrence.id.to_string())
        .bind(occurrence.template_id.map(|id| id.to_string()))
        .bind(&occurrence.name)
        .bind(occurrence.start_at.to_rfc3339())
        .bind(occurrence.end_at.to_rfc3339())
        .bind(&occurrence.location)
        .bind(&occurrence.description)
        .bind(occurrence.event_type.as_str())
        .bind(occurrence.is_public)
        .bind(&occurrence.primary_host)
        .bind(serde_json::to_string(&occurrence.secondary_hosts)?)
        .bind(serde_json::to_string(&occurrence.attachments)?)
        .bind(occurrence.created_at.to_rfc3339())
        .bind(occurrence.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, occurrence: &Occurrence) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE occurrences
            SET template_id = ?, name = ?, start_at = ?, end_at = ?, location = ?, description = ?,
                event_type = ?, is_public = ?, primary_host = ?, secondary_hosts = ?, attachments = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(occurrence.template_id.map(|id| id.to_string()))
        .bind(&occurrence.name)
        .bind(occurrence.start_at.to_rfc3339())
        .bind(occurrence.end_at.to_rfc3339())
        .bind(&occurrence.location)
        .bind(&occurrence.description)
        .bind(occurrence.event_type.as_str())
        .bind(occurrence.is_public)
        .bind(&occurrence.primary_host)
        .bind(serde_json::to_string(&occurrence.secondary_hosts)?)
        .bind(serde_json::to_string(&occurrence.attachments)?)
        .bind(occurrence.updated_at.to_rfc3339())
        .bind(occurrence.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("occurrence {}", occurrence.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM occurrences WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use portal_common::db::init_memory_database;

    fn occurrence(name: &str) -> Occurrence {
        let start = Utc.with_ymd_and_hms(2024, 9, 3, 18, 0, 0).unwrap();
        let mut occ = Occurrence::new(name, start, start + chrono::Duration::hours(2), start);
        occ.template_id = Some(Uuid::new_v4());
        occ.location = Some("Union 101".to_string());
        occ.secondary_hosts = vec!["chess".to_string(), "go".to_string()];
        occ
    }

    #[tokio::test]
    async fn test_occurrence_round_trips_through_table() {
        let store = SqliteOccurrenceStore::new(init_memory_database().await.unwrap());
        let occ = occurrence("GBM");
        store.create(&occ).await.unwrap();

        assert_eq!(store.get(occ.id).await.unwrap(), Some(occ.clone()));

        let template_id = occ.template_id.unwrap();
        let slot = store.find_slot(template_id, occ.start_at, occ.end_at).await.unwrap();
        assert_eq!(slot.map(|o| o.id), Some(occ.id));
        assert_eq!(store.for_template(template_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unique_name_and_window() {
        let store = SqliteOccurrenceStore::new(init_memory_database().await.unwrap());
        let occ = occurrence("GBM");
        store.create(&occ).await.unwrap();

        assert!(store.name_taken("GBM", occ.start_at, occ.end_at, None).await.unwrap());
        assert!(!store.name_taken("GBM", occ.start_at, occ.end_at, Some(occ.id)).await.unwrap());
        assert!(store.create(&occurrence("GBM")).await.is_err());
    }

    #[tokio::test]
    async fn test_detached_update_and_delete() {
        let store = SqliteOccurrenceStore::new(init_memory_database().await.unwrap());
        let mut occ = occurrence("GBM");
        store.create(&occ).await.unwrap();

        occ.detach();
        store.update(&occ).await.unwrap();
        assert!(store.get(occ.id).await.unwrap().unwrap().template_id.is_none());

        store.delete(occ.id).await.unwrap();
        assert!(store.get(occ.id).await.unwrap().is_none());
        assert!(matches!(store.update(&occ).await.unwrap_err(), Error::NotFound(_)));
    }
}
