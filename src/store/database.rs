//! `SQLite` backend through `SeaORM`.
//!
//! All documents live in the `documents` table keyed by `(collection, doc_id)`.

use super::{KvStore, Table, validate_id};
use crate::{
    config::database::create_connection,
    entities::{Document, DocumentColumn, document},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*, sea_query::OnConflict};
use serde_json::Value;
use tracing::debug;

/// Document store backed by a `SeaORM` connection.
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    /// Wraps an existing connection whose tables have already been created.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connects to `url` and creates the tables if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self::new(create_connection(url).await?))
    }

    fn active_model(table: Table, id: &str, doc: &Value) -> Result<document::ActiveModel> {
        Ok(document::ActiveModel {
            collection: Set(table.name().to_string()),
            doc_id: Set(id.to_string()),
            body: Set(serde_json::to_string(doc)?),
            updated_at: Set(chrono::Utc::now()),
        })
    }
}

impl KvStore for DatabaseStore {
    async fn get(&self, table: Table, id: &str) -> Result<Value> {
        let row = Document::find_by_id((table.name().to_string(), id.to_string()))
            .one(&self.db)
            .await?
            .ok_or_else(|| Error::not_found(table.name(), id))?;
        Ok(serde_json::from_str(&row.body)?)
    }

    async fn set(&self, table: Table, id: &str, doc: &Value) -> Result<()> {
        validate_id(table, id)?;
        let model = Self::active_model(table, id, doc)?;
        Document::insert(model)
            .on_conflict(
                OnConflict::columns([DocumentColumn::Collection, DocumentColumn::DocId])
                    .update_columns([DocumentColumn::Body, DocumentColumn::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        debug!("Stored {table}/{id}");
        Ok(())
    }

    async fn set_if_absent(&self, table: Table, id: &str, doc: &Value) -> Result<bool> {
        validate_id(table, id)?;
        let model = Self::active_model(table, id, doc)?;
        let inserted = Document::insert(model)
            .on_conflict(
                OnConflict::columns([DocumentColumn::Collection, DocumentColumn::DocId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(inserted > 0)
    }

    async fn ids(&self, table: Table) -> Result<Vec<String>> {
        let ids = Document::find()
            .select_only()
            .column(DocumentColumn::DocId)
            .filter(DocumentColumn::Collection.eq(table.name()))
            .order_by_asc(DocumentColumn::DocId)
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }
}
