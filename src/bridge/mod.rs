//! Chat bridge - delivering messages and role changes to Discord.
//!
//! Notifications are best-effort: callers go through [`Bridge::notify_channel`] and friends,
//! which log failures instead of returning them, so a Discord outage never rolls back a
//! ledger entry or a signup.

pub mod command;
pub mod discord;

pub use command::CommandBridge;
pub use discord::DiscordBridge;

use crate::{core::person::Snowflake, errors::Result};
use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{info, warn};

/// Operations the portal needs from the Discord side.
pub trait ChatBridge: Send + Sync {
    /// Posts a message to a guild channel.
    fn send_channel(
        &self,
        channel: Snowflake,
        text: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Sends a direct message to a user.
    fn send_dm(&self, user: Snowflake, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Sets (or with `None`, clears) a member's guild nickname.
    fn set_nickname(
        &self,
        user: Snowflake,
        nick: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Gives a member a guild role.
    fn add_role(&self, user: Snowflake, role: Snowflake)
    -> impl Future<Output = Result<()>> + Send;
}

/// A message recorded by the [`MemoryBridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// `send_channel`
    Channel(Snowflake, String),
    /// `send_dm`
    Dm(Snowflake, String),
    /// `set_nickname`
    Nickname(Snowflake, Option<String>),
    /// `add_role`
    Role(Snowflake, Snowflake),
}

/// Bridge that only records what it was asked to do.
///
/// Used when no Discord connection is configured (everything is logged) and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBridge {
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl MemoryBridge {
    /// Creates an empty bridge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, entry: Sent) {
        info!("chat bridge: {entry:?}");
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl ChatBridge for MemoryBridge {
    async fn send_channel(&self, channel: Snowflake, text: &str) -> Result<()> {
        self.push(Sent::Channel(channel, text.to_string()));
        Ok(())
    }

    async fn send_dm(&self, user: Snowflake, text: &str) -> Result<()> {
        self.push(Sent::Dm(user, text.to_string()));
        Ok(())
    }

    async fn set_nickname(&self, user: Snowflake, nick: Option<&str>) -> Result<()> {
        self.push(Sent::Nickname(user, nick.map(str::to_string)));
        Ok(())
    }

    async fn add_role(&self, user: Snowflake, role: Snowflake) -> Result<()> {
        self.push(Sent::Role(user, role));
        Ok(())
    }
}

/// The configured chat bridge.
#[derive(Debug, Clone)]
pub enum Bridge {
    /// Discord HTTP API through the bot client
    Discord(DiscordBridge),
    /// External bot command
    Command(CommandBridge),
    /// Log and record only
    Memory(MemoryBridge),
}

impl ChatBridge for Bridge {
    async fn send_channel(&self, channel: Snowflake, text: &str) -> Result<()> {
        match self {
            Self::Discord(bridge) => bridge.send_channel(channel, text).await,
            Self::Command(bridge) => bridge.send_channel(channel, text).await,
            Self::Memory(bridge) => bridge.send_channel(channel, text).await,
        }
    }

    async fn send_dm(&self, user: Snowflake, text: &str) -> Result<()> {
        match self {
            Self::Discord(bridge) => bridge.send_dm(user, text).await,
            Self::Command(bridge) => bridge.send_dm(user, text).await,
            Self::Memory(bridge) => bridge.send_dm(user, text).await,
        }
    }

    async fn set_nickname(&self, user: Snowflake, nick: Option<&str>) -> Result<()> {
        match self {
            Self::Discord(bridge) => bridge.set_nickname(user, nick).await,
            Self::Command(bridge) => bridge.set_nickname(user, nick).await,
            Self::Memory(bridge) => bridge.set_nickname(user, nick).await,
        }
    }

    async fn add_role(&self, user: Snowflake, role: Snowflake) -> Result<()> {
        match self {
            Self::Discord(bridge) => bridge.add_role(user, role).await,
            Self::Command(bridge) => bridge.add_role(user, role).await,
            Self::Memory(bridge) => bridge.add_role(user, role).await,
        }
    }
}

impl Bridge {
    /// Posts to a channel, logging instead of failing.
    pub async fn notify_channel(&self, channel: Snowflake, text: &str) {
        if let Err(e) = self.send_channel(channel, text).await {
            warn!("Failed to post to channel {channel}: {e}");
        }
    }

    /// Sends a DM, logging instead of failing.
    pub async fn notify_dm(&self, user: Snowflake, text: &str) {
        if let Err(e) = self.send_dm(user, text).await {
            warn!("Failed to DM {user}: {e}");
        }
    }

    /// Updates a nickname, logging instead of failing.
    pub async fn sync_nickname(&self, user: Snowflake, nick: Option<&str>) {
        if let Err(e) = self.set_nickname(user, nick).await {
            warn!("Failed to set nickname of {user}: {e}");
        }
    }

    /// Adds a role, logging instead of failing.
    pub async fn grant_role(&self, user: Snowflake, role: Snowflake) {
        if let Err(e) = self.add_role(user, role).await {
            warn!("Failed to give {user} role {role}: {e}");
        }
    }
}
