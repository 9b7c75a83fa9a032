//! In-memory occurrence store

use super::OccurrenceStore;
use crate::occurrence::Occurrence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_common::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryOccurrenceStore {
    occurrences: RwLock<HashMap<Uuid, Occurrence>>,
}

impl MemoryOccurrenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.occurrences.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.occurrences.read().await.is_empty()
    }

    /// Every stored occurrence, ordered by start
    pub async fn all(&self) -> Vec<Occurrence> {
        let mut all: Vec<Occurrence> = self.occurrences.read().await.values().cloned().collect();
        all.sort_by_key(|o| (o.start_at, o.name.clone()));
        all
    }
}

#[async_trait]
impl OccurrenceStore for MemoryOccurrenceStore {
    async fn for_template(&self, template_id: Uuid) -> Result<Vec<Occurrence>> {
        let mut owned: Vec<Occurrence> = self
            .occurrences
            .read()
            .await
            .values()
            .filter(|o| o.template_id == Some(template_id))
            .cloned()
            .collect();
        owned.sort_by_key(|o| o.start_at);
        Ok(owned)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Occurrence>> {
        Ok(self.occurrences.read().await.get(&id).cloned())
    }

    async fn find_slot(
        &self,
        template_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Option<Occurrence>> {
        Ok(self
            .occurrences
            .read()
            .await
            .values()
            .find(|o| o.template_id == Some(template_id) && o.start_at == start_at && o.end_at == end_at)
            .cloned())
    }

    async fn name_taken(
        &self,
        name: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool> {
        Ok(self.occurrences.read().await.values().any(|o| {
            Some(o.id) != exclude && o.name == name && o.start_at == start_at && o.end_at == end_at
        }))
    }

    async fn create(&self, occurrence: &Occurrence) -> Result<()> {
        let mut occurrences = self.occurrences.write().await;
        let clash = occurrences.values().any(|o| {
            o.name == occurrence.name && o.start_at == occurrence.start_at && o.end_at == occurrence.end_at
        });
        if clash {
            return Err(Error::Conflict(format!(
                "occurrence '{}' already exists at {}",
                occurrence.name, occurrence.start_at
            )));
        }
        occurrences.insert(occurrence.id, occurrence.clone());
        Ok(())
    }

    async fn update(&self, occurrence: &Occurrence) -> Result<()> {
        let mut occurrences = self.occurrences.write().await;
        let stored = occurrences
            .get_mut(&occurrence.id)
            .ok_or_else(|| Error::NotFound(format!("occurrence {}", occurrence.id)))?;
        *stored = occurrence.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.occurrences.write().await.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn occurrence(name: &str, template_id: Option<Uuid>) -> Occurrence {
        let start = Utc.with_ymd_and_hms(2024, 9, 3, 18, 0, 0).unwrap();
        let mut occ = Occurrence::new(name, start, start + chrono::Duration::hours(1), start);
        occ.template_id = template_id;
        occ
    }

    #[tokio::test]
    async fn test_slot_lookup_is_per_template() {
        let store = MemoryOccurrenceStore::new();
        let template = Uuid::new_v4();
        let owned = occurrence("GBM", Some(template));
        store.create(&owned).await.unwrap();
        store.create(&occurrence("GBM 1", None)).await.unwrap();

        let found = store.find_slot(template, owned.start_at, owned.end_at).await.unwrap();
        assert_eq!(found.map(|o| o.id), Some(owned.id));
        assert!(store.find_slot(Uuid::new_v4(), owned.start_at, owned.end_at).await.unwrap().is_none());
        assert_eq!(store.for_template(template).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_name_taken_honours_exclude() {
        let store = MemoryOccurrenceStore::new();
        let occ = occurrence("GBM", None);
        store.create(&occ).await.unwrap();

        assert!(store.name_taken("GBM", occ.start_at, occ.end_at, None).await.unwrap());
        assert!(!store.name_taken("GBM", occ.start_at, occ.end_at, Some(occ.id)).await.unwrap());
        assert!(!store.name_taken("GBM 1", occ.start_at, occ.end_at, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let store = MemoryOccurrenceStore::new();
        store.create(&occurrence("GBM", None)).await.unwrap();
        assert!(store.create(&occurrence("GBM", None)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryOccurrenceStore::new();
        let err = store.update(&occurrence("GBM", None)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
