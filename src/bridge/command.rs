//! External bot command bridge.
//!
//! Invocations: `<bin> channel-msg <channel_id> <text>`, `<bin> msg <user_id> <text>`,
//! `<bin> set-display-name <user_id> <nick>` and `<bin> add-role <user_id> <role_id>`.
//! Each prints a fixed confirmation line on success.

use super::ChatBridge;
use crate::{
    core::person::Snowflake,
    errors::{Error, Result},
};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Bridge that shells out to the community bot's command interface.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    bin: PathBuf,
}

impl CommandBridge {
    /// Creates a bridge invoking the given executable.
    pub fn new(bin: impl AsRef<Path>) -> Self {
        Self {
            bin: bin.as_ref().to_path_buf(),
        }
    }

    async fn run(&self, args: &[&str], expected: &str) -> Result<()> {
        let output = Command::new(&self.bin).args(args).output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && stdout.trim() == expected {
            Ok(())
        } else {
            Err(Error::External {
                message: format!(
                    "{} {} exited with {} and printed {:?}",
                    self.bin.display(),
                    args.first().copied().unwrap_or_default(),
                    output.status,
                    stdout.trim()
                ),
            })
        }
    }
}

impl ChatBridge for CommandBridge {
    async fn send_channel(&self, channel: Snowflake, text: &str) -> Result<()> {
        self.run(&["channel-msg", &channel.to_string(), text], "message sent")
            .await
    }

    async fn send_dm(&self, user: Snowflake, text: &str) -> Result<()> {
        self.run(&["msg", &user.to_string(), text], "message sent")
            .await
    }

    async fn set_nickname(&self, user: Snowflake, nick: Option<&str>) -> Result<()> {
        self.run(
            &["set-display-name", &user.to_string(), nick.unwrap_or_default()],
            "display name set",
        )
        .await
    }

    async fn add_role(&self, user: Snowflake, role: Snowflake) -> Result<()> {
        self.run(&["add-role", &user.to_string(), &role.to_string()], "role added")
            .await
    }
}
