//! Bot layer - Discord-specific interface and command handlers
//!
//! Slash commands are thin wrappers around the core operations; the portal they act on
//! is built once the client is connected, since the Discord bridge needs its HTTP client.

/// Discord command implementations (general, ledger, event)
pub mod commands;
/// Discord interaction handlers (autocomplete)
pub mod handlers;

use crate::{
    bridge::{Bridge, CommandBridge, DiscordBridge, MemoryBridge},
    config::{BridgeConfig, PortalConfig},
    core::{person::Snowflake, portal::Portal},
    errors::{Error, Result},
    store::Store,
};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Shared data available to all bot commands.
pub struct BotData {
    /// Store, bridge and config every command works against
    pub portal: Arc<Portal>,
}

impl BotData {
    /// Creates a new `BotData` around a portal.
    #[must_use]
    pub const fn new(portal: Arc<Portal>) -> Self {
        Self { portal }
    }
}

/// Poise context of this bot.
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// The Discord id of the command author.
#[must_use]
pub fn author(ctx: Context<'_>) -> Snowflake {
    Snowflake::new(ctx.author().id.get())
}

/// Builds the configured chat bridge.
#[must_use]
pub fn build_bridge(config: &PortalConfig, http: &Arc<serenity::Http>) -> Bridge {
    match &config.bridge {
        BridgeConfig::Discord => Bridge::Discord(DiscordBridge::new(Arc::clone(http), config.guild)),
        BridgeConfig::Command { bin } => Bridge::Command(CommandBridge::new(bin)),
        BridgeConfig::Log => Bridge::Memory(MemoryBridge::new()),
    }
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            if error.is_user_facing() {
                info!("Command `{}` refused: {}", ctx.command().name, error);
            } else {
                error!("Error in command `{}`: {:?}", ctx.command().name, error);
            }
            let message = if error.is_user_facing() {
                format!("❌ {error}")
            } else {
                "❌ An internal error occurred.".to_string()
            };
            if let Err(e) = ctx.say(message).await {
                error!("Failed to send error message: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Connects to Discord and serves the slash commands until the client stops.
#[instrument(skip(token, config, store))]
pub async fn run_bot(token: String, config: Arc<PortalConfig>, store: Store) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::help(),
                commands::balance(),
                commands::transfer(),
                commands::treasurer(),
                commands::signup(),
                commands::guest(),
                commands::confirm(),
                commands::calendar(),
            ],
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                let guild = serenity::GuildId::new(config.guild.get());
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild).await?;
                info!("Registered commands in guild {}", guild);
                let bridge = build_bridge(&config, &ctx.http);
                Ok(BotData::new(Arc::new(Portal::new(store, bridge, config))))
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MEMBERS;

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::Client::builder(&token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;
    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {:?}", e))?;
    Ok(())
}
