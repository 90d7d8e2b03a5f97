//! Locations events take place at.

use crate::{
    core::{person::Snowflake, portal::Portal},
    errors::{Error, Result},
    store::Table,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

/// A stored location document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Display name
    pub name: String,
    /// IANA timezone of the venue
    pub timezone: String,
    /// Postal address, used as calendar `LOCATION`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Link to the house rules attendees must accept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hausordnung: Option<String>,
    /// Mensch hosting the location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Snowflake>,
    /// Online "location": no signups, no dinners
    #[serde(default)]
    pub is_online: bool,
    /// Rooms attendees can be assigned to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<Room>,
    /// Fields maintained by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A room at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room id referenced by attendee records
    pub id: String,
    /// Number of beds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds: Option<u32>,
    /// Fields maintained by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    /// Loads a location by id.
    pub async fn load(portal: &Portal, id: &str) -> Result<Self> {
        portal.store.load(Table::Locations, id).await
    }

    /// Whether the location has a room with this id.
    #[must_use]
    pub fn has_room(&self, room: &str) -> bool {
        self.rooms.iter().any(|r| r.id == room)
    }
}

/// Stores a new location. Admin only; existing locations are never overwritten.
pub async fn create_location(portal: &Portal, editor: Snowflake, id: &str, location: &Location) -> Result<()> {
    if !portal.is_admin(editor) {
        return Err(Error::authz("only the admin can add locations"));
    }
    if !portal.store.create(Table::Locations, id, location).await? {
        return Err(Error::precondition(format!("location {id} already exists")));
    }
    info!("Created location {id}");
    Ok(())
}
