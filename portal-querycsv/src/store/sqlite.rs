//! SQLite store
//!
//! Each entity is one row of the `entities` table with its fields as a JSON
//! document. Lookups by id hit the primary key; field lookups load the
//! model's rows and match in process. A [`SqliteTransaction`] wraps an
//! `sqlx` transaction behind the same [`Store`] interface.

use super::{merge_fields, Entity, Fields, Lookup, Store, StoreTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn entity_from_row(row: &SqliteRow) -> Result<Entity> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str).map_err(|e| Error::Internal(format!("bad entity id {}: {}", id_str, e)))?;

    let data: String = row.get("data");
    let fields: Fields = serde_json::from_str(&data)?;

    Ok(Entity {
        id,
        model: row.get("model"),
        fields,
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {}: {}", value, e)))
}

// Statements run on a bare connection so the pool and open transactions
// share them.

async fn select_rows(conn: &mut SqliteConnection, model: &str, lookup: &Lookup) -> Result<Vec<Entity>> {
    if let Lookup::Id(id) = lookup {
        let row = sqlx::query("SELECT id, model, data, created_at, updated_at FROM entities WHERE id = ? AND model = ?")
            .bind(id.to_string())
            .bind(model)
            .fetch_optional(&mut *conn)
            .await?;

        return row.as_ref().map(entity_from_row).transpose().map(|e| e.into_iter().collect());
    }

    Ok(select_model(conn, model)
        .await?
        .into_iter()
        .filter(|e| lookup.matches(e))
        .collect())
}

async fn select_model(conn: &mut SqliteConnection, model: &str) -> Result<Vec<Entity>> {
    let rows =
        sqlx::query("SELECT id, model, data, created_at, updated_at FROM entities WHERE model = ? ORDER BY rowid")
            .bind(model)
            .fetch_all(&mut *conn)
            .await?;

    rows.iter().map(entity_from_row).collect()
}

async fn insert_row(conn: &mut SqliteConnection, model: &str, fields: Fields) -> Result<Entity> {
    let entity = Entity::new(model, fields, portal_common::time::now());

    sqlx::query(
        r#"
        INSERT INTO entities (id, model, data, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity.id.to_string())
    .bind(&entity.model)
    .bind(serde_json::to_string(&entity.fields)?)
    .bind(entity.created_at.to_rfc3339())
    .bind(entity.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(entity)
}

async fn update_row(conn: &mut SqliteConnection, entity: &Entity, fields: Fields) -> Result<Entity> {
    let mut current = select_rows(&mut *conn, &entity.model, &Lookup::Id(entity.id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("{} {}", entity.model, entity.id)))?;

    merge_fields(&mut current.fields, fields);
    current.updated_at = portal_common::time::now();

    sqlx::query("UPDATE entities SET data = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(&current.fields)?)
        .bind(current.updated_at.to_rfc3339())
        .bind(current.id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(current)
}

async fn delete_row(conn: &mut SqliteConnection, entity: &Entity) -> Result<()> {
    sqlx::query("DELETE FROM entities WHERE id = ?")
        .bind(entity.id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn filter(&self, model: &str, lookup: &Lookup) -> Result<Vec<Entity>> {
        let mut conn = self.pool.acquire().await?;
        select_rows(&mut conn, model, lookup).await
    }

    async fn all(&self, model: &str) -> Result<Vec<Entity>> {
        let mut conn = self.pool.acquire().await?;
        select_model(&mut conn, model).await
    }

    async fn create(&self, model: &str, fields: Fields) -> Result<Entity> {
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut conn, model, fields).await
    }

    async fn update(&self, entity: &Entity, fields: Fields) -> Result<Entity> {
        let mut conn = self.pool.acquire().await?;
        update_row(&mut conn, entity, fields).await
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        delete_row(&mut conn, entity).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx: Mutex::new(tx) }))
    }
}

/// Open SQLite transaction
///
/// Holds one pooled connection until commit or rollback.
pub struct SqliteTransaction {
    tx: Mutex<Transaction<'static, Sqlite>>,
}

#[async_trait]
impl Store for SqliteTransaction {
    async fn filter(&self, model: &str, lookup: &Lookup) -> Result<Vec<Entity>> {
        let mut tx = self.tx.lock().await;
        select_rows(&mut tx, model, lookup).await
    }

    async fn all(&self, model: &str) -> Result<Vec<Entity>> {
        let mut tx = self.tx.lock().await;
        select_model(&mut tx, model).await
    }

    async fn create(&self, model: &str, fields: Fields) -> Result<Entity> {
        let mut tx = self.tx.lock().await;
        insert_row(&mut tx, model, fields).await
    }

    async fn update(&self, entity: &Entity, fields: Fields) -> Result<Entity> {
        let mut tx = self.tx.lock().await;
        update_row(&mut tx, entity, fields).await
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        let mut tx = self.tx.lock().await;
        delete_row(&mut tx, entity).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Err(Error::Internal("transaction already open".to_string()))
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    fn store(&self) -> &dyn Store {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_common::db::init_memory_database;
    use serde_json::json;

    #[tokio::test]
    async fn test_entities_persist_as_json() {
        let store = SqliteStore::new(init_memory_database().await.unwrap());

        let fields = json!({"name": "Chess", "tags": ["a", "b"]}).as_object().unwrap().clone();
        let created = store.create("club", fields).await.unwrap();

        let loaded = store.get("club", created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);

        // another model never sees it
        assert!(store.get("team", created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_and_filter_matches() {
        let store = SqliteStore::new(init_memory_database().await.unwrap());
        let created = store
            .create("club", json!({"name": "Chess"}).as_object().unwrap().clone())
            .await
            .unwrap();

        store
            .update(&created, json!({"name": "Go", "size": 4}).as_object().unwrap().clone())
            .await
            .unwrap();

        let hits = store
            .filter("club", &Lookup::Any(vec![("name".into(), json!("Go"))]))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fields["size"], json!(4));

        store.delete(&hits[0]).await.unwrap();
        assert!(store.all("club").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_rollback_and_commit() {
        let store = SqliteStore::new(init_memory_database().await.unwrap());
        let fields = |v: serde_json::Value| v.as_object().unwrap().clone();

        let tx = store.begin().await.unwrap();
        let club = tx.store().create("club", fields(json!({"name": "Chess"}))).await.unwrap();
        tx.store().create("tag", fields(json!({"name": "x"}))).await.unwrap();
        assert_eq!(tx.store().all("tag").await.unwrap().len(), 1);
        tx.rollback().await.unwrap();

        assert!(store.get("club", club.id).await.unwrap().is_none());
        assert!(store.all("tag").await.unwrap().is_empty());

        let tx = store.begin().await.unwrap();
        tx.store().create("club", fields(json!({"name": "Go"}))).await.unwrap();
        assert!(tx.store().begin().await.is_err());
        tx.commit().await.unwrap();

        assert_eq!(store.all("club").await.unwrap().len(), 1);
    }
}
