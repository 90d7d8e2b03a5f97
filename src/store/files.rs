//! JSON files backend.
//!
//! Layout under the base path: `profiles/{snowflake}.json`, `userdata/{snowflake}.json`,
//! `event/{event_id}.json`, `loc/{loc_id}.json`. Writes go to a temporary file that is then
//! renamed over the target, so readers never see half-written documents.

use super::{KvStore, Table, validate_id};
use crate::errors::{Error, Result};
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

/// Document store backed by a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `base`. Directories are created on first write.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    fn path(&self, table: Table, id: &str) -> Result<PathBuf> {
        validate_id(table, id)?;
        Ok(self.base.join(table.dir()).join(format!("{id}.json")))
    }

    async fn ensure_dir(&self, table: Table) -> Result<()> {
        fs::create_dir_all(self.base.join(table.dir())).await?;
        Ok(())
    }
}

impl KvStore for FileStore {
    async fn get(&self, table: Table, id: &str) -> Result<Value> {
        let path = self.path(table, id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::not_found(table.name(), id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, table: Table, id: &str, doc: &Value) -> Result<()> {
        let path = self.path(table, id)?;
        self.ensure_dir(table).await?;
        let tmp = path.with_extension("json.tmp");
        let mut bytes = serde_json::to_vec_pretty(doc)?;
        bytes.push(b'\n');
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn set_if_absent(&self, table: Table, id: &str, doc: &Value) -> Result<bool> {
        let path = self.path(table, id)?;
        self.ensure_dir(table).await?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = serde_json::to_vec_pretty(doc)?;
        bytes.push(b'\n');
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(true)
    }

    async fn ids(&self, table: Table) -> Result<Vec<String>> {
        let dir = self.base.join(table.dir());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                if validate_id(table, id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
