//! External KV command backend.
//!
//! The command is invoked as `<bin> <table> get|set|set-if-not-exists|list <id> [<json>]`.
//! `get` prints the document (or `null` if it is absent), `list` prints a JSON array of ids;
//! the other subcommands print a status line. A non-zero exit status is a failure.

use super::{KvStore, Table, validate_id};
use crate::errors::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Status line printed by `set-if-not-exists` when the document already existed.
const ALREADY_EXISTS: &str = "already exists";

/// Document store that shells out to an external KV command.
#[derive(Debug, Clone)]
pub struct CommandStore {
    bin: PathBuf,
}

impl CommandStore {
    /// Creates a store invoking the given executable.
    pub fn new(bin: impl AsRef<Path>) -> Self {
        Self {
            bin: bin.as_ref().to_path_buf(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {:?}", self.bin.display(), args.get(..3.min(args.len())));
        let output = Command::new(&self.bin).args(args).output().await?;
        if !output.status.success() {
            return Err(Error::External {
                message: format!(
                    "{} {} exited with {}: {}",
                    self.bin.display(),
                    args.join(" "),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        String::from_utf8(output.stdout).map_err(|e| Error::External {
            message: format!("KV command printed invalid UTF-8: {e}"),
        })
    }
}

impl KvStore for CommandStore {
    async fn get(&self, table: Table, id: &str) -> Result<Value> {
        validate_id(table, id)?;
        let stdout = self.run(&[table.name(), "get", id]).await?;
        match serde_json::from_str::<Value>(stdout.trim())? {
            Value::Null => Err(Error::not_found(table.name(), id)),
            doc => Ok(doc),
        }
    }

    async fn set(&self, table: Table, id: &str, doc: &Value) -> Result<()> {
        validate_id(table, id)?;
        let json = serde_json::to_string(doc)?;
        self.run(&[table.name(), "set", id, &json]).await?;
        Ok(())
    }

    async fn set_if_absent(&self, table: Table, id: &str, doc: &Value) -> Result<bool> {
        validate_id(table, id)?;
        let json = serde_json::to_string(doc)?;
        let stdout = self
            .run(&[table.name(), "set-if-not-exists", id, &json])
            .await?;
        Ok(stdout.trim() != ALREADY_EXISTS)
    }

    async fn ids(&self, table: Table) -> Result<Vec<String>> {
        let stdout = self.run(&[table.name(), "list"]).await?;
        let mut ids: Vec<String> = serde_json::from_str(stdout.trim())?;
        ids.sort();
        Ok(ids)
    }
}
