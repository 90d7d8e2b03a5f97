//! Portal configuration loaded from `config.toml`.
//!
//! The configured snowflakes (admin, treasurer, the fixed custom-Magic-draft orga) and
//! role ids live here and are passed around as one `Arc<PortalConfig>` instead of being
//! global constants.

use crate::{
    core::person::Snowflake,
    errors::{Error, Result},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the portal config file.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level portal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Public base url used for profile links and calendar `URL` properties
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// The admin, who can override most permission checks
    pub admin: Snowflake,
    /// The treasurer, who confirms bank transfers and holds unsettled deposits
    pub treasurer: Snowflake,
    /// Fixed orga of the custom Magic draft programm item
    pub magic_orga: Snowflake,
    /// Discord guild of the community
    pub guild: Snowflake,
    /// Role that marks verified members ("Menschen")
    pub member_role: Snowflake,
    /// Role that marks Discord guests
    pub guest_role: Snowflake,
    /// Where documents are stored
    #[serde(default)]
    pub store: StoreConfig,
    /// How chat notifications are delivered
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Custom Magic sets that can be voted on
    #[serde(default)]
    pub magic_sets: Vec<MagicSetConfig>,
}

fn default_base_url() -> String {
    "https://gefolge.org".to_string()
}

/// Selects the KV store backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// JSON files under a base directory
    Files {
        /// Base directory holding `profiles/`, `userdata/`, `event/` and `loc/`
        path: PathBuf,
    },
    /// `SQLite` via `SeaORM`
    Database {
        /// Connection url, overridden by `DATABASE_URL`
        #[serde(default)]
        url: Option<String>,
    },
    /// External KV command
    Command {
        /// Path to the executable
        bin: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Database { url: None }
    }
}

/// Selects the chat bridge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BridgeConfig {
    /// Talk to Discord directly through the bot's HTTP client
    Discord,
    /// Shell out to an external bot command
    Command {
        /// Path to the executable
        bin: PathBuf,
    },
    /// Only log messages
    #[default]
    Log,
}

/// A custom Magic set that can be drafted at an event.
#[derive(Debug, Clone, Deserialize)]
pub struct MagicSetConfig {
    /// Short set code used as vote key
    pub code: String,
    /// Display name
    pub name: String,
    /// Description shown once the set has been chosen for an event
    #[serde(default)]
    pub blurb: Option<String>,
    /// Event id this set was drafted at, if any
    #[serde(default)]
    pub drafted: Option<String>,
}

impl PortalConfig {
    /// Parses a config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config {
            message: format!("Failed to parse portal config: {e}"),
        })
    }

    /// Loads the config from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
        let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
            message: format!("Failed to read config file {}: {e}", path_ref.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Loads the config from `GEFOLGE_CONFIG` (or `config.toml`) and applies env overrides.
    pub fn load_from_env() -> Result<Self> {
        let path = std::env::var("GEFOLGE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        if let (StoreConfig::Database { url }, Ok(env_url)) =
            (&mut config.store, std::env::var("DATABASE_URL"))
        {
            *url = Some(env_url);
        }
        Ok(config)
    }

    /// Whether the given person may bypass the usual permission and balance checks.
    #[must_use]
    pub fn is_admin(&self, person: Snowflake) -> bool {
        person == self.admin
    }

    /// Looks up a configured Magic set by code.
    #[must_use]
    pub fn magic_set(&self, code: &str) -> Option<&MagicSetConfig> {
        self.magic_sets.iter().find(|set| set.code == code)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    const MINIMAL: &str = r#"
        admin = 86841168427495424
        treasurer = 353614449681154049
        magic_orga = 86841168427495424
        guild = 355761290809180170
        member_role = 386753710434287626
        guest_role = 784929665478557737
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = PortalConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.base_url, "https://gefolge.org");
        assert_eq!(config.admin, Snowflake::new(86_841_168_427_495_424));
        assert!(matches!(config.store, StoreConfig::Database { url: None }));
        assert!(matches!(config.bridge, BridgeConfig::Log));
        assert!(config.magic_sets.is_empty());
    }

    #[test]
    fn test_full_config() {
        let toml_str = format!(
            r#"{MINIMAL}
            base_url = "http://localhost:8000"

            [store]
            kind = "files"
            path = "/var/lib/gefolge"

            [bridge]
            kind = "command"
            bin = "/usr/local/bin/peter"

            [[magic_sets]]
            code = "rtr"
            name = "Return to Ravnica"
            blurb = "Gilden!"
            drafted = "2023w"

            [[magic_sets]]
            code = "xyz"
            name = "Custom XYZ"
            "#
        );
        let config = PortalConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert!(
            matches!(&config.store, StoreConfig::Files { path } if path == Path::new("/var/lib/gefolge"))
        );
        assert!(matches!(config.bridge, BridgeConfig::Command { .. }));
        assert_eq!(config.magic_sets.len(), 2);
        assert_eq!(
            config.magic_set("rtr").and_then(|s| s.drafted.as_deref()),
            Some("2023w")
        );
        assert!(config.magic_set("nope").is_none());
    }

    #[test]
    fn test_missing_snowflake_is_config_error() {
        let result = PortalConfig::from_toml("admin = 1");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
