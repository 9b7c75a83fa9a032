//! Create-or-update of nested records
//!
//! **Resolution:** a record carrying the `id` of an existing entity updates
//! it. Otherwise every unique field with a value joins one OR lookup: no hit
//! creates, one hit updates, hits on different entities reject the row.
//!
//! **Write buckets:**
//! - scalars are written directly
//! - slug references and single nested objects are get-or-created on the
//!   related model and stored as its id
//! - many-to-many fields are set after the primary write, replacing the
//!   previous members
//! - reverse children get the parent id injected, then are get-or-created
//!   (reverse one-to-one children are update-or-created by parent)
//! - image URLs are fetched before anything is written and attached after
//!   the primary write
//!
//! Everything a row writes goes through one store transaction.

use crate::error::{RowError, UpsertError};
use crate::flat::NestedRecord;
use crate::media::MediaFetcher;
use crate::schema::{
    is_blank, FieldDescriptor, FieldKind, ModelSchema, Relation, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::store::{Entity, Fields, Lookup, Store};
use portal_common::{HookList, PortalEvent};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

type EngineResult<T> = std::result::Result<T, UpsertError>;

/// Result of a successful upsert
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub entity: Entity,
    pub created: bool,
}

pub struct UpsertEngine {
    schema: Arc<ModelSchema>,
    store: Arc<dyn Store>,
    media: Option<Arc<dyn MediaFetcher>>,
    hooks: HookList,
}

impl UpsertEngine {
    pub fn new(schema: Arc<ModelSchema>, store: Arc<dyn Store>) -> Self {
        Self {
            schema,
            store,
            media: None,
            hooks: HookList::new(),
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaFetcher>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_hooks(mut self, hooks: HookList) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn hooks(&self) -> &HookList {
        &self.hooks
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Existing entity this record addresses, if any
    pub async fn resolve_instance(&self, record: &NestedRecord) -> EngineResult<Option<Entity>> {
        let model = self.schema.model();

        if let Some(id) = record
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
        {
            if let Some(entity) = self.store.get(model, id).await? {
                return Ok(Some(entity));
            }
        }

        let pairs: Vec<(String, Value)> = self
            .schema
            .unique_fields()
            .filter_map(|field| {
                let value = record.get(field.name()).filter(|v| !is_blank(v))?;
                let value = match value {
                    Value::String(s) => Value::String(s.trim().to_string()),
                    other => field.coerce(other),
                };
                Some((field.name().to_string(), value))
            })
            .collect();

        if pairs.is_empty() {
            return Ok(None);
        }

        let fields: Vec<String> = pairs.iter().map(|(name, _)| name.clone()).collect();
        let mut matches = self.store.filter(model, &Lookup::Any(pairs)).await?;

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(RowError::ConflictingUniqueKey {
                fields,
                entity_ids: matches.iter().map(|e| e.id).collect(),
            }
            .into()),
        }
    }

    /// Resolve then create or update
    pub async fn upsert(&self, record: &NestedRecord) -> EngineResult<UpsertOutcome> {
        match self.resolve_instance(record).await? {
            Some(instance) => Ok(UpsertOutcome {
                entity: self.update(&instance, record).await?,
                created: false,
            }),
            None => Ok(UpsertOutcome {
                entity: self.create(record).await?,
                created: true,
            }),
        }
    }

    pub async fn create(&self, record: &NestedRecord) -> EngineResult<Entity> {
        let data = self.schema.validate(record, false).map_err(RowError::FieldValidation)?;
        self.write(None, data).await
    }

    /// Update with direct assignment; many-to-many fields are replaced
    pub async fn update(&self, instance: &Entity, record: &NestedRecord) -> EngineResult<Entity> {
        let data = self.schema.validate(record, true).map_err(RowError::FieldValidation)?;
        self.write(Some(instance), data).await
    }

    // ========================================================================
    // Writing
    // ========================================================================

    async fn write(&self, instance: Option<&Entity>, data: Map<String, Value>) -> EngineResult<Entity> {
        let model = self.schema.model();

        // media first, so a dead URL rejects the row before anything is written
        let mut media = Fields::new();
        for (name, value) in &data {
            if let (Some(FieldKind::Image), Some(url)) =
                (self.schema.field_named(name).map(FieldDescriptor::kind), value.as_str())
            {
                media.insert(name.clone(), Value::String(self.fetch_media(name, url).await?));
            }
        }

        let tx = self.store.begin().await?;
        let written = self.write_row(tx.store(), instance, data, media).await;
        let (entity, created) = match written {
            Ok(saved) => {
                tx.commit().await?;
                saved
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(model, error = %rollback, "Rollback failed");
                }
                return Err(e);
            }
        };

        tracing::info!(
            model,
            entity_id = %entity.id,
            created,
            "Saved entity"
        );

        self.hooks.notify(&PortalEvent::EntitySaved {
            model: model.to_string(),
            entity_id: entity.id,
            created,
            timestamp: entity.updated_at,
        });

        Ok(entity)
    }

    async fn write_row(
        &self,
        store: &dyn Store,
        instance: Option<&Entity>,
        data: Map<String, Value>,
        mut attached: Fields,
    ) -> EngineResult<(Entity, bool)> {
        let model = self.schema.model();
        let mut direct = Fields::new();
        let mut reverse: Vec<(&FieldDescriptor, Value)> = Vec::new();

        for (name, value) in data {
            let Some(descriptor) = self.schema.field_named(&name) else {
                continue;
            };

            match descriptor.kind() {
                FieldKind::Scalar(_) | FieldKind::ScalarList(_) => {
                    direct.insert(name, value);
                }
                FieldKind::Image => {}
                FieldKind::SlugRelated { model: related, slug_field, many: false } => {
                    let id = slug_reference(store, related, slug_field, &value).await?;
                    direct.insert(name, Value::String(id.to_string()));
                }
                FieldKind::SlugRelated { model: related, slug_field, many: true } => {
                    let mut ids = Vec::new();
                    for slug in value.as_array().into_iter().flatten() {
                        ids.push(Value::String(slug_reference(store, related, slug_field, slug).await?.to_string()));
                    }
                    attached.insert(name, Value::Array(ids));
                }
                FieldKind::Nested { schema, relation: Relation::ForeignKey, .. } => {
                    let child = get_or_create_child(store, schema, &value, None).await?;
                    direct.insert(name, Value::String(child.id.to_string()));
                }
                FieldKind::Nested { schema, relation: Relation::ManyToMany, .. } => {
                    let mut ids = Vec::new();
                    for item in value.as_array().into_iter().flatten() {
                        let child = get_or_create_child(store, schema, item, None).await?;
                        ids.push(Value::String(child.id.to_string()));
                    }
                    attached.insert(name, Value::Array(ids));
                }
                FieldKind::Nested { .. } => reverse.push((descriptor, value)),
            }
        }

        let (mut entity, created) = match instance {
            None => (store.create(model, direct).await?, true),
            Some(existing) => (store.update(existing, direct).await?, false),
        };

        if !attached.is_empty() {
            entity = store.update(&entity, attached).await?;
        }

        for (descriptor, value) in reverse {
            write_reverse(store, &entity, descriptor, value).await?;
        }

        Ok((entity, created))
    }

    async fn fetch_media(&self, field: &str, url: &str) -> EngineResult<String> {
        match &self.media {
            Some(fetcher) => fetcher.fetch(url).await.map_err(|source| {
                RowError::RemoteMediaFetch {
                    field: field.to_string(),
                    source,
                }
                .into()
            }),
            // without a fetcher the URL itself is kept
            None => Ok(url.to_string()),
        }
    }

    // ========================================================================
    // Representation
    // ========================================================================

    /// Persisted entity shaped like the schema, relations expanded
    pub async fn to_representation(&self, entity: &Entity) -> portal_common::Result<NestedRecord> {
        let mut out = self.base_representation(&self.schema, entity, None).await?;

        for descriptor in self.schema.get_field_descriptors() {
            if !descriptor.is_readable() {
                continue;
            }
            let (Some(schema), Some(relation)) = (descriptor.nested_schema(), descriptor.relation()) else {
                continue;
            };

            let related: Vec<Entity> = match relation {
                Relation::ForeignKey | Relation::ManyToMany => {
                    let mut items = Vec::new();
                    for id in entity.related_ids(descriptor.name()) {
                        items.extend(self.store.get(schema.model(), id).await?);
                    }
                    items
                }
                Relation::ReverseMany { remote_field } | Relation::ReverseOne { remote_field } => {
                    let lookup = Lookup::All(vec![(remote_field.clone(), Value::String(entity.id.to_string()))]);
                    self.store.filter(schema.model(), &lookup).await?
                }
            };

            let mut children = Vec::with_capacity(related.len());
            for child in &related {
                children.push(Value::Object(
                    self.base_representation(schema, child, relation.remote_field()).await?,
                ));
            }

            let value = if descriptor.is_list() {
                Value::Array(children)
            } else {
                children.into_iter().next().unwrap_or(Value::Null)
            };
            out.insert(descriptor.name().to_string(), value);
        }

        Ok(out)
    }

    /// Non-nested fields of one entity, slug references shown as slugs
    async fn base_representation(
        &self,
        schema: &ModelSchema,
        entity: &Entity,
        skip_field: Option<&str>,
    ) -> portal_common::Result<NestedRecord> {
        let mut out = NestedRecord::new();
        out.insert(ID_FIELD.to_string(), Value::String(entity.id.to_string()));
        out.insert(CREATED_AT_FIELD.to_string(), Value::String(entity.created_at.to_rfc3339()));
        out.insert(UPDATED_AT_FIELD.to_string(), Value::String(entity.updated_at.to_rfc3339()));

        for descriptor in schema.get_field_descriptors() {
            let name = descriptor.name();
            if !descriptor.is_readable()
                || descriptor.is_nested()
                || skip_field == Some(name)
                || out.contains_key(name)
            {
                continue;
            }

            match descriptor.kind() {
                FieldKind::SlugRelated { model, slug_field, many } => {
                    let mut slugs = Vec::new();
                    for id in entity.related_ids(name) {
                        if let Some(related) = self.store.get(model, id).await? {
                            slugs.extend(related.get(slug_field).cloned());
                        }
                    }
                    let value = if *many {
                        Value::Array(slugs)
                    } else {
                        slugs.into_iter().next().unwrap_or(Value::Null)
                    };
                    out.insert(name.to_string(), value);
                }
                _ => {
                    out.insert(name.to_string(), entity.get(name).cloned().unwrap_or(Value::Null));
                }
            }
        }

        Ok(out)
    }
}

async fn slug_reference(store: &dyn Store, model: &str, slug_field: &str, slug: &Value) -> EngineResult<Uuid> {
    let lookup = Lookup::All(vec![(slug_field.to_string(), slug.clone())]);
    let (entity, created) = store.get_or_create(model, &lookup, Fields::new()).await?;
    if created {
        tracing::debug!(model, slug = %slug, "Created related entity from slug");
    }
    Ok(entity.id)
}

/// Child fields as stored: slugs resolved to ids, nested values dropped
async fn child_fields(store: &dyn Store, schema: &ModelSchema, item: &Value) -> EngineResult<Fields> {
    let mut fields = Fields::new();
    let Some(map) = item.as_object() else {
        return Ok(fields);
    };

    for (name, value) in map {
        let Some(descriptor) = schema.field_named(name) else {
            continue;
        };
        match descriptor.kind() {
            FieldKind::SlugRelated { model, slug_field, many: false } => {
                let id = slug_reference(store, model, slug_field, value).await?;
                fields.insert(name.clone(), Value::String(id.to_string()));
            }
            FieldKind::SlugRelated { model, slug_field, many: true } => {
                let mut ids = Vec::new();
                for slug in value.as_array().into_iter().flatten() {
                    ids.push(Value::String(slug_reference(store, model, slug_field, slug).await?.to_string()));
                }
                fields.insert(name.clone(), Value::Array(ids));
            }
            FieldKind::Nested { .. } => {}
            _ => {
                fields.insert(name.clone(), value.clone());
            }
        }
    }

    Ok(fields)
}

/// Get-or-create a child keyed by all of its non-list fields
async fn get_or_create_child(
    store: &dyn Store,
    schema: &ModelSchema,
    item: &Value,
    parent: Option<(&str, Uuid)>,
) -> EngineResult<Entity> {
    let mut fields = child_fields(store, schema, item).await?;
    if let Some((remote_field, parent_id)) = parent {
        fields.insert(remote_field.to_string(), Value::String(parent_id.to_string()));
    }

    let (search, defaults): (Vec<_>, Vec<_>) = fields.into_iter().partition(|(_, v)| !v.is_array());
    let (child, _) = store
        .get_or_create(schema.model(), &Lookup::All(search), defaults.into_iter().collect())
        .await?;
    Ok(child)
}

async fn write_reverse(
    store: &dyn Store,
    parent: &Entity,
    descriptor: &FieldDescriptor,
    value: Value,
) -> EngineResult<()> {
    let (Some(schema), Some(relation)) = (descriptor.nested_schema(), descriptor.relation()) else {
        return Ok(());
    };
    let Some(remote_field) = relation.remote_field() else {
        return Ok(());
    };

    match relation {
        Relation::ReverseMany { .. } => {
            for item in value.as_array().into_iter().flatten() {
                get_or_create_child(store, schema, item, Some((remote_field, parent.id))).await?;
            }
        }
        Relation::ReverseOne { .. } => {
            let fields = child_fields(store, schema, &value).await?;
            let lookup = Lookup::All(vec![(remote_field.to_string(), Value::String(parent.id.to_string()))]);
            store.update_or_create(schema.model(), &lookup, fields).await?;
        }
        _ => {}
    }

    Ok(())
}
