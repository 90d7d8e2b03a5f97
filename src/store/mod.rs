//! Durable JSON document storage.
//!
//! Documents are addressed by `(table, id)` and always read and written whole. Three
//! backends implement [`KvStore`]: a directory of JSON files, a `SQLite` table through
//! `SeaORM`, and an external KV command. [`Store`] dispatches between them so the rest of
//! the crate works with one concrete type.
//!
//! None of the backends serialise concurrent writers; callers take a [`LockTable`] guard
//! around every read-modify-write.

pub mod command;
pub mod database;
pub mod files;

pub use command::CommandStore;
pub use database::DatabaseStore;
pub use files::FileStore;

use crate::{
    config::{StoreConfig, database::get_database_url},
    errors::{Error, Result},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

/// The document tables of the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Discord profiles, keyed by snowflake
    Profiles,
    /// Per-user data including the transaction log, keyed by snowflake
    UserData,
    /// Events, keyed by event id
    Events,
    /// Locations, keyed by location id
    Locations,
}

impl Table {
    /// Logical table name, used by the database and command backends.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::UserData => "userdata",
            Self::Events => "events",
            Self::Locations => "locations",
        }
    }

    /// Directory name in the on-disk layout.
    #[must_use]
    pub const fn dir(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::UserData => "userdata",
            Self::Events => "event",
            Self::Locations => "loc",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whole-document storage keyed by `(table, id)`.
pub trait KvStore: Send + Sync {
    /// Reads a document. Fails with [`Error::NotFound`] if it does not exist.
    fn get(&self, table: Table, id: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Writes a document, replacing any previous version.
    fn set(&self, table: Table, id: &str, doc: &Value)
    -> impl Future<Output = Result<()>> + Send;

    /// Writes a document only if none exists yet. Returns whether it was written.
    fn set_if_absent(
        &self,
        table: Table,
        id: &str,
        doc: &Value,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Lists the ids of all documents in a table, sorted.
    fn ids(&self, table: Table) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// The configured storage backend.
#[derive(Debug, Clone)]
pub enum Store {
    /// JSON files on disk
    Files(FileStore),
    /// `SQLite` via `SeaORM`
    Database(DatabaseStore),
    /// External KV command
    Command(CommandStore),
}

impl Store {
    /// Opens the backend selected in the config.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let store = match config {
            StoreConfig::Files { path } => Self::Files(FileStore::new(path)),
            StoreConfig::Database { url } => {
                let url = get_database_url(url.as_deref());
                Self::Database(DatabaseStore::connect(&url).await?)
            }
            StoreConfig::Command { bin } => Self::Command(CommandStore::new(bin)),
        };
        info!("Opened {} document store", store.kind());
        Ok(store)
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Files(_) => "files",
            Self::Database(_) => "database",
            Self::Command(_) => "command",
        }
    }

    /// Reads and deserialises a document.
    pub async fn load<T: DeserializeOwned>(&self, table: Table, id: &str) -> Result<T> {
        let value = self.get(table, id).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Reads a document, falling back to `T::default()` if it does not exist.
    pub async fn load_or_default<T: DeserializeOwned + Default>(
        &self,
        table: Table,
        id: &str,
    ) -> Result<T> {
        match self.load(table, id).await {
            Err(e) if e.is_not_found() => Ok(T::default()),
            other => other,
        }
    }

    /// Serialises and writes a document.
    pub async fn save<T: Serialize + Sync>(&self, table: Table, id: &str, doc: &T) -> Result<()> {
        let value = serde_json::to_value(doc)?;
        self.set(table, id, &value).await
    }

    /// Serialises and writes a document only if none exists yet.
    pub async fn create<T: Serialize + Sync>(
        &self,
        table: Table,
        id: &str,
        doc: &T,
    ) -> Result<bool> {
        let value = serde_json::to_value(doc)?;
        self.set_if_absent(table, id, &value).await
    }
}

impl KvStore for Store {
    async fn get(&self, table: Table, id: &str) -> Result<Value> {
        match self {
            Self::Files(store) => store.get(table, id).await,
            Self::Database(store) => store.get(table, id).await,
            Self::Command(store) => store.get(table, id).await,
        }
    }

    async fn set(&self, table: Table, id: &str, doc: &Value) -> Result<()> {
        match self {
            Self::Files(store) => store.set(table, id, doc).await,
            Self::Database(store) => store.set(table, id, doc).await,
            Self::Command(store) => store.set(table, id, doc).await,
        }
    }

    async fn set_if_absent(&self, table: Table, id: &str, doc: &Value) -> Result<bool> {
        match self {
            Self::Files(store) => store.set_if_absent(table, id, doc).await,
            Self::Database(store) => store.set_if_absent(table, id, doc).await,
            Self::Command(store) => store.set_if_absent(table, id, doc).await,
        }
    }

    async fn ids(&self, table: Table) -> Result<Vec<String>> {
        match self {
            Self::Files(store) => store.ids(table).await,
            Self::Database(store) => store.ids(table).await,
            Self::Command(store) => store.ids(table).await,
        }
    }
}

/// Rejects ids that would escape their table (path separators, dot files, empty).
pub(crate) fn validate_id(table: Table, id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid {table} id {id:?}")))
    }
}

/// Per-document async locks.
///
/// Locks are created on first use and live as long as the table. A guard must be held for
/// the whole read-modify-write of a document.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<(Table, String), Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the document `(table, id)`.
    pub async fn lock(&self, table: Table, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry((table, id.to_string())).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_store;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[tokio::test]
    async fn test_typed_round_trip() -> Result<()> {
        let store = setup_test_store().await?;
        let note = Note {
            text: "hallo".to_string(),
        };
        store.save(Table::Locations, "bielefeld", &note).await?;
        let back: Note = store.load(Table::Locations, "bielefeld").await?;
        assert_eq!(back, note);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_default_for_missing_document() -> Result<()> {
        let store = setup_test_store().await?;
        let note: Note = store.load_or_default(Table::UserData, "123").await?;
        assert_eq!(note, Note::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_reports_not_found() -> Result<()> {
        let store = setup_test_store().await?;
        let result = store.load::<Note>(Table::Events, "nope").await;
        assert!(result.is_err_and(|e| e.is_not_found()));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_does_not_overwrite() -> Result<()> {
        let store = setup_test_store().await?;
        assert!(store.create(Table::Profiles, "1", &json!({"a": 1})).await?);
        assert!(!store.create(Table::Profiles, "1", &json!({"a": 2})).await?);
        assert_eq!(store.get(Table::Profiles, "1").await?, json!({"a": 1}));
        Ok(())
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id(Table::Events, "2024s").is_ok());
        assert!(validate_id(Table::Events, "silvester-2024").is_ok());
        assert!(validate_id(Table::Events, "../etc/passwd").is_err());
        assert!(validate_id(Table::Events, ".hidden").is_err());
        assert!(validate_id(Table::Events, "").is_err());
    }

    #[tokio::test]
    async fn test_lock_serialises_access() {
        let locks = Arc::new(LockTable::new());
        let guard = locks.lock(Table::Events, "e").await;
        let other = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _guard = other.lock(Table::Events, "e").await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        assert!(waiter.await.is_ok());
    }
}
