//! Database configuration module for the `SQLite` document backend.
//!
//! This module handles `SQLite` connection setup and creation of the `documents` table using
//! `SeaORM`'s `Schema::create_table_from_entity`, so the schema always matches the entity
//! definition without hand-written SQL.

use crate::entities::Document;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Default database location when neither the config nor `DATABASE_URL` name one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/gefolge.sqlite?mode=rwc";

/// Gets the database URL from the given override, the environment, or the default path.
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    configured.map_or_else(
        || std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        str::to_string,
    )
}

/// Establishes a connection to the `SQLite` database and makes sure the tables exist.
pub async fn create_connection(url: &str) -> Result<DatabaseConnection> {
    let db = Database::connect(url).await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Creates the `documents` table if it does not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut document_table = schema.create_table_from_entity(Document);
    document_table.if_not_exists();

    db.execute(builder.build(&document_table)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DocumentModel;
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<DocumentModel> = Document::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[test]
    fn test_explicit_url_wins() {
        assert_eq!(get_database_url(Some("sqlite::memory:")), "sqlite::memory:");
    }
}
