//! Backing store interface
//!
//! The engine only needs filter / get-or-create / create / update / delete,
//! always returning materialized entities. Relations are stored as entity ids:
//! a foreign key is the related id as a string, a many-to-many field is an
//! array of ids, and reverse children carry the parent id in their remote
//! field.
//!
//! Writes that belong together go through a [`StoreTransaction`] opened with
//! [`Store::begin`]; nothing written through it survives a rollback.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryStore, MemoryTransaction};
pub use sqlite::{SqliteStore, SqliteTransaction};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type Fields = Map<String, Value>;

/// One persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub model: String,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(model: &str, fields: Fields, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.to_string(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Ids held by a relation field
    pub fn related_ids(&self, field: &str) -> Vec<Uuid> {
        match self.fields.get(field) {
            Some(Value::String(s)) => Uuid::parse_str(s).into_iter().collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Store query
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Id(Uuid),
    /// Any of the field/value pairs matches (OR)
    Any(Vec<(String, Value)>),
    /// Every field/value pair matches (AND)
    All(Vec<(String, Value)>),
}

impl Lookup {
    pub fn all_of(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::All(pairs.into_iter().collect())
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::Id(id) => entity.id == *id,
            Self::Any(pairs) => pairs.iter().any(|(field, value)| field_matches(entity, field, value)),
            Self::All(pairs) => pairs.iter().all(|(field, value)| field_matches(entity, field, value)),
        }
    }

    /// Field values a created entity should start from
    pub fn seed_fields(&self) -> Fields {
        match self {
            Self::All(pairs) => pairs.iter().cloned().collect(),
            _ => Fields::new(),
        }
    }
}

fn field_matches(entity: &Entity, field: &str, expected: &Value) -> bool {
    if field == "id" {
        return expected.as_str() == Some(entity.id.to_string().as_str());
    }
    match entity.fields.get(field) {
        Some(actual) => values_match(actual, expected),
        None => expected.is_null(),
    }
}

/// Equality tolerant of spreadsheet typing ("3" matches 3)
pub fn values_match(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => false,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => scalar_string(a).trim() == scalar_string(b).trim(),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge `changes` over `fields`; a null change removes the field
pub fn merge_fields(fields: &mut Fields, changes: Fields) {
    for (key, value) in changes {
        if value.is_null() {
            fields.remove(&key);
        } else {
            fields.insert(key, value);
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Entities of `model` matching the lookup, in creation order
    async fn filter(&self, model: &str, lookup: &Lookup) -> Result<Vec<Entity>>;

    /// Every entity of `model`, in creation order
    async fn all(&self, model: &str) -> Result<Vec<Entity>>;

    async fn create(&self, model: &str, fields: Fields) -> Result<Entity>;

    /// Merge fields into an existing entity
    async fn update(&self, entity: &Entity, fields: Fields) -> Result<Entity>;

    async fn delete(&self, entity: &Entity) -> Result<()>;

    /// Open a unit of work over this store
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    async fn get(&self, model: &str, id: Uuid) -> Result<Option<Entity>> {
        Ok(self.filter(model, &Lookup::Id(id)).await?.into_iter().next())
    }

    /// First match, or a new entity from the lookup pairs plus `defaults`
    async fn get_or_create(&self, model: &str, lookup: &Lookup, defaults: Fields) -> Result<(Entity, bool)> {
        if let Some(existing) = self.filter(model, lookup).await?.into_iter().next() {
            return Ok((existing, false));
        }

        let mut fields = lookup.seed_fields();
        merge_fields(&mut fields, defaults);
        Ok((self.create(model, fields).await?, true))
    }

    /// Update the first match with `defaults`, or create it
    async fn update_or_create(&self, model: &str, lookup: &Lookup, defaults: Fields) -> Result<(Entity, bool)> {
        match self.filter(model, lookup).await?.into_iter().next() {
            Some(existing) => Ok((self.update(&existing, defaults).await?, false)),
            None => {
                let mut fields = lookup.seed_fields();
                merge_fields(&mut fields, defaults);
                Ok((self.create(model, fields).await?, true))
            }
        }
    }
}

/// Writes made through [`StoreTransaction::store`] are kept by `commit` and
/// undone by `rollback`
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    fn store(&self) -> &dyn Store;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
