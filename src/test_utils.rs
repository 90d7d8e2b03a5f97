//! Shared test utilities for the portal.
//!
//! Provides an in-memory `SQLite` document store, a portal wired to a recording chat
//! bridge, and builders for profiles, events and locations with sensible defaults.

use crate::{
    bridge::{Bridge, MemoryBridge},
    config::{BridgeConfig, MagicSetConfig, PortalConfig, StoreConfig},
    core::{
        event::{Attendee, Event, EventDoc},
        ledger::{self, Transaction},
        location::{Location, Room},
        money::Euro,
        person::{Profile, Snowflake},
        portal::Portal,
    },
    errors::Result,
    store::{DatabaseStore, Store, Table},
};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::{collections::BTreeSet, sync::Arc};

/// The configured admin.
pub const ADMIN: u64 = 100_000_001;
/// The configured treasurer.
pub const TREASURER: u64 = 100_000_002;
/// The configured custom Magic draft orga.
pub const MAGIC_ORGA: u64 = 100_000_003;
/// Regular members.
pub const MENSCH_A: u64 = 200_000_001;
#[allow(missing_docs)]
pub const MENSCH_B: u64 = 200_000_002;
#[allow(missing_docs)]
pub const MENSCH_C: u64 = 200_000_003;
#[allow(missing_docs)]
pub const MENSCH_D: u64 = 200_000_004;
#[allow(missing_docs)]
pub const MENSCH_E: u64 = 200_000_005;
/// Guild and roles.
pub const GUILD: u64 = 300_000_001;
#[allow(missing_docs)]
pub const MEMBER_ROLE: u64 = 300_000_002;
#[allow(missing_docs)]
pub const GUEST_ROLE: u64 = 300_000_003;
/// Announcement channel and attendee role used by events that set them.
pub const CHANNEL: u64 = 400_000_001;
#[allow(missing_docs)]
pub const EVENT_ROLE: u64 = 400_000_002;

/// Portal config using the ids above and two Magic sets: `cube` (draftable) and `old`
/// (drafted at the event `drafted`).
#[must_use]
pub fn test_config() -> PortalConfig {
    PortalConfig {
        base_url: "https://gefolge.org".to_string(),
        admin: Snowflake::new(ADMIN),
        treasurer: Snowflake::new(TREASURER),
        magic_orga: Snowflake::new(MAGIC_ORGA),
        guild: Snowflake::new(GUILD),
        member_role: Snowflake::new(MEMBER_ROLE),
        guest_role: Snowflake::new(GUEST_ROLE),
        store: StoreConfig::Database {
            url: Some("sqlite::memory:".to_string()),
        },
        bridge: BridgeConfig::Log,
        magic_sets: vec![
            MagicSetConfig {
                code: "cube".to_string(),
                name: "Gefolge Cube".to_string(),
                blurb: None,
                drafted: None,
            },
            MagicSetConfig {
                code: "old".to_string(),
                name: "Old Set".to_string(),
                blurb: Some("Ein Set aus alten Zeiten.".to_string()),
                drafted: Some("drafted".to_string()),
            },
        ],
    }
}

/// Creates an in-memory `SQLite` document store with all tables initialized.
/// This is the standard storage for all tests.
pub async fn setup_test_store() -> Result<Store> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(Store::Database(DatabaseStore::new(db)))
}

/// A portal over a fresh in-memory store, plus a handle on its recording chat bridge.
pub async fn setup_test_portal() -> Result<(Portal, MemoryBridge)> {
    let store = setup_test_store().await?;
    let bridge = MemoryBridge::new();
    let portal = Portal::new(store, Bridge::Memory(bridge.clone()), Arc::new(test_config()));
    Ok((portal, bridge))
}

async fn add_profile(portal: &Portal, id: u64, username: &str, role: u64) -> Result<()> {
    let profile = Profile {
        username: username.to_string(),
        discriminator: Some("0".to_string()),
        roles: BTreeSet::from([Snowflake::new(role)]),
        ..Profile::default()
    };
    portal
        .store
        .save(Table::Profiles, &id.to_string(), &profile)
        .await
}

/// Stores a profile with the member role.
pub async fn add_mensch(portal: &Portal, id: u64, username: &str) -> Result<()> {
    add_profile(portal, id, username, MEMBER_ROLE).await
}

/// Stores a profile with only the guest role.
pub async fn add_discord_guest(portal: &Portal, id: u64, username: &str) -> Result<()> {
    add_profile(portal, id, username, GUEST_ROLE).await
}

/// Gives a user credit (or debt, for negative amounts) through a transfer from the treasurer.
pub async fn credit(portal: &Portal, id: u64, amount: Euro) -> Result<()> {
    let tx = Transaction::transfer(Snowflake::new(TREASURER), amount, Some("Guthaben"), Utc::now());
    ledger::record(portal, Snowflake::new(id), tx).await
}

/// 2099-12-`day` at `hour`:00, the month all test events take place in.
///
/// # Panics
/// On an invalid day or hour.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn test_time(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2099, 12, day)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
}

/// An event from 2099-12-27 18:00 to 2099-12-30 10:00 without attendees or location.
#[must_use]
pub fn test_event(id: &str, anzahlung: Option<Euro>, ausfall: Option<Euro>) -> Event {
    Event {
        id: id.to_string(),
        data: EventDoc {
            name: format!("Test-Event {id}"),
            start: test_time(27, 18),
            end: test_time(30, 10),
            timezone: "Europe/Berlin".to_string(),
            location: None,
            role: None,
            channel: None,
            anzahlung,
            ausfall,
            ausfall_date: None,
            signup_block: None,
            guest_signup_block: None,
            attendees: Vec::new(),
            programm: std::collections::BTreeMap::new(),
            essen: std::collections::BTreeMap::new(),
            extra: serde_json::Map::new(),
        },
        location: None,
    }
}

/// Adds a confirmed attendee. Signup times increase with every call, so attendees are
/// ordered as added.
#[allow(clippy::unwrap_used)]
pub fn confirm_attendee(event: &mut Event, id: u64, anzahlung: Option<Euro>) {
    let first_signup: DateTime<Utc> = DateTime::parse_from_rfc3339("2099-01-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let offset = i64::try_from(event.data.attendees.len()).unwrap();
    let mut attendee = Attendee::mensch(Snowflake::new(id));
    attendee.signup = Some(first_signup + Duration::seconds(offset));
    attendee.anzahlung = anzahlung;
    event.data.attendees.push(attendee);
}

/// Writes an event document.
pub async fn save_event(portal: &Portal, event: &Event) -> Result<()> {
    event.save(portal).await
}

/// Writes a location document.
pub async fn save_location(portal: &Portal, id: &str, location: &Location) -> Result<()> {
    portal.store.save(Table::Locations, id, location).await
}

/// A location with the room `dach`, or an online one.
#[must_use]
pub fn test_location(online: bool) -> Location {
    Location {
        name: if online { "Discord" } else { "Burg" }.to_string(),
        timezone: "Europe/Berlin".to_string(),
        address: (!online).then(|| "Burgweg 1, 12345 Burg".to_string()),
        hausordnung: None,
        host: None,
        is_online: online,
        rooms: if online {
            Vec::new()
        } else {
            vec![Room {
                id: "dach".to_string(),
                beds: Some(4),
                extra: serde_json::Map::new(),
            }]
        },
        extra: serde_json::Map::new(),
    }
}
