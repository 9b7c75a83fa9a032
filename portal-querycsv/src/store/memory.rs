//! In-memory store

use super::{merge_fields, Entity, Fields, Lookup, Store, StoreTransaction};
use async_trait::async_trait;
use portal_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Models = HashMap<String, Vec<Entity>>;

/// Store keeping entities per model in insertion order
///
/// Clones share the same entities.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    models: Arc<RwLock<Models>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, model: &str) -> usize {
        self.models.read().await.get(model).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn filter(&self, model: &str, lookup: &Lookup) -> Result<Vec<Entity>> {
        let models = self.models.read().await;
        Ok(models
            .get(model)
            .map(|entities| entities.iter().filter(|e| lookup.matches(e)).cloned().collect())
            .unwrap_or_default())
    }

    async fn all(&self, model: &str) -> Result<Vec<Entity>> {
        Ok(self.models.read().await.get(model).cloned().unwrap_or_default())
    }

    async fn create(&self, model: &str, fields: Fields) -> Result<Entity> {
        let entity = Entity::new(model, fields, portal_common::time::now());
        self.models
            .write()
            .await
            .entry(model.to_string())
            .or_default()
            .push(entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: &Entity, fields: Fields) -> Result<Entity> {
        let mut models = self.models.write().await;
        let stored = models
            .get_mut(&entity.model)
            .and_then(|entities| entities.iter_mut().find(|e| e.id == entity.id))
            .ok_or_else(|| Error::NotFound(format!("{} {}", entity.model, entity.id)))?;

        merge_fields(&mut stored.fields, fields);
        stored.updated_at = portal_common::time::now();
        Ok(stored.clone())
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        let mut models = self.models.write().await;
        if let Some(entities) = models.get_mut(&entity.model) {
            entities.retain(|e| e.id != entity.id);
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let snapshot = self.models.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            snapshot,
        }))
    }
}

/// Writes straight through; rollback puts back the whole store as it was at
/// `begin`
#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    snapshot: Models,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn store(&self) -> &dyn Store {
        &self.store
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        *self.store.models.write().await = self.snapshot;
        Ok(())
    }
}
