//! Discord bridge through the bot's serenity HTTP client.

use super::ChatBridge;
use crate::{core::person::Snowflake, errors::Result};
use poise::serenity_prelude as serenity;
use std::{fmt, sync::Arc};

/// Bridge that talks to the Discord API directly.
#[derive(Clone)]
pub struct DiscordBridge {
    http: Arc<serenity::Http>,
    guild: serenity::GuildId,
}

impl fmt::Debug for DiscordBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordBridge")
            .field("guild", &self.guild)
            .finish_non_exhaustive()
    }
}

impl DiscordBridge {
    /// Creates a bridge for the given guild using an existing HTTP client.
    #[must_use]
    pub fn new(http: Arc<serenity::Http>, guild: Snowflake) -> Self {
        Self {
            http,
            guild: serenity::GuildId::new(guild.get()),
        }
    }
}

impl ChatBridge for DiscordBridge {
    async fn send_channel(&self, channel: Snowflake, text: &str) -> Result<()> {
        serenity::ChannelId::new(channel.get())
            .say(&self.http, text)
            .await?;
        Ok(())
    }

    async fn send_dm(&self, user: Snowflake, text: &str) -> Result<()> {
        let dm = serenity::UserId::new(user.get())
            .create_dm_channel(Arc::clone(&self.http))
            .await?;
        dm.id.say(&self.http, text).await?;
        Ok(())
    }

    async fn set_nickname(&self, user: Snowflake, nick: Option<&str>) -> Result<()> {
        self.guild
            .edit_member(
                Arc::clone(&self.http),
                serenity::UserId::new(user.get()),
                serenity::EditMember::new().nickname(nick.unwrap_or_default()),
            )
            .await?;
        Ok(())
    }

    async fn add_role(&self, user: Snowflake, role: Snowflake) -> Result<()> {
        self.http
            .add_member_role(
                self.guild,
                serenity::UserId::new(user.get()),
                serenity::RoleId::new(role.get()),
                Some("gefolge.org event signup"),
            )
            .await?;
        Ok(())
    }
}
