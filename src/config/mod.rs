/// Portal configuration (snowflakes, roles, backends) from config.toml
pub mod app;

/// Database configuration and connection management
pub mod database;

pub use app::{BridgeConfig, MagicSetConfig, PortalConfig, StoreConfig};
