use gefolge_portal::{
    bot,
    config::PortalConfig,
    errors::{Error, Result},
    store::Store,
};
use dotenvy::dotenv;
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the portal configuration
    let config = PortalConfig::load_from_env()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!("Successfully loaded portal configuration.");

    // 4. Open the document store
    let store = Store::open(&config.store)
        .await
        .inspect_err(|e| error!("Failed to open document store: {}", e))?;

    // 5. Run the bot
    // DISCORD_BOT_TOKEN is read directly before use, not stored in the config
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    bot::run_bot(token, Arc::new(config), store).await?;

    Ok(())
}
