//! Document entity - One JSON document of the KV store.
//!
//! Rows are keyed by `(collection, doc_id)`, mirroring the `(table, id)` addressing of the
//! files backend. The body is the serialised JSON text.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Document database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    /// Table name, e.g. `"events"`
    #[sea_orm(primary_key, auto_increment = false)]
    pub collection: String,
    /// Document id within the table
    #[sea_orm(primary_key, auto_increment = false)]
    pub doc_id: String,
    /// JSON text of the document
    #[sea_orm(column_type = "Text")]
    pub body: String,
    /// When the document was last written
    pub updated_at: DateTimeUtc,
}

/// Documents are standalone; relations between them live inside the JSON
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
