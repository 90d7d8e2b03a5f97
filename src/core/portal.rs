//! The services every portal operation works against.

use crate::{
    bridge::Bridge,
    config::PortalConfig,
    core::person::Snowflake,
    store::{LockTable, Store},
};
use std::sync::Arc;

/// Storage, chat bridge, configuration and document locks, bundled.
///
/// One `Portal` is created at startup and shared (behind an `Arc`) by all requests.
#[derive(Debug)]
pub struct Portal {
    /// Document storage
    pub store: Store,
    /// Best-effort chat notifications
    pub bridge: Bridge,
    /// Configured snowflakes, roles and Magic sets
    pub config: Arc<PortalConfig>,
    /// Per-document locks for read-modify-write sections
    pub locks: LockTable,
}

impl Portal {
    /// Bundles the services.
    #[must_use]
    pub fn new(store: Store, bridge: Bridge, config: Arc<PortalConfig>) -> Self {
        Self {
            store,
            bridge,
            config,
            locks: LockTable::new(),
        }
    }

    /// Whether `person` is the admin.
    #[must_use]
    pub fn is_admin(&self, person: Snowflake) -> bool {
        self.config.is_admin(person)
    }

    /// Whether `person` is the treasurer.
    #[must_use]
    pub fn is_treasurer(&self, person: Snowflake) -> bool {
        person == self.config.treasurer
    }
}
