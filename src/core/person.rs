//! Person registry - who is who on the portal.
//!
//! Discord users are identified by their snowflake. A profile document records their
//! username and guild roles; the roles decide whether someone is a verified member
//! ("Mensch"), a Discord guest, or nobody we know. Guests brought along to one event
//! ("Gäste") only exist inside that event and are resolved through it.

use crate::{
    core::{ledger::UserData, portal::Portal},
    errors::{Error, Result},
    store::{KvStore, Table},
};
use rand::Rng;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, Unexpected, Visitor},
};
use serde_json::{Map, Value};
use std::{collections::BTreeSet, fmt, str::FromStr};
use tracing::{debug, info, instrument};

/// Length of generated API keys.
pub const API_KEY_LEN: usize = 25;

/// Realm sent with `WWW-Authenticate` when an API request lacks a valid key.
pub const API_KEY_REALM: &str = "Basic realm=\"gefolge.org API key required\"";

/// HTTP Basic username that must accompany an API key.
pub const API_KEY_USERNAME: &str = "api";

const API_KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Ids below this are per-event guest ids, not Discord snowflakes.
pub const GUEST_ID_LIMIT: u64 = 100;

/// A Discord user id, or (below 100) a guest id within one event.
///
/// Deserialises from a JSON number or a numeric string, since snowflakes also appear as
/// object keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is a per-event guest id rather than a Discord user.
    #[must_use]
    pub const fn is_guest(self) -> bool {
        self.0 < GUEST_ID_LIMIT
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a Discord snowflake")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Snowflake, E> {
                Ok(Snowflake(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Snowflake, E> {
                u64::try_from(v)
                    .map(Snowflake)
                    .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Snowflake, E> {
                v.parse()
                    .map(Snowflake)
                    .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

impl FromStr for Snowflake {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| Error::validation(format!("'{s}' is not a Discord id")))
    }
}

/// A stored Discord profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Discord username
    pub username: String,
    /// Legacy 4-digit discriminator (`"0"` for migrated accounts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    /// Guild nickname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    /// Guild role ids
    #[serde(default)]
    pub roles: BTreeSet<Snowflake>,
    /// Fields maintained by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A Discord user with a stored profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Discord snowflake
    pub id: Snowflake,
    /// Stored profile
    pub profile: Profile,
}

impl Member {
    /// Nickname, falling back to the username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.profile
            .nick
            .as_deref()
            .unwrap_or(&self.profile.username)
    }

    /// `username#discriminator`, or just the username for accounts without one.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.profile.discriminator.as_deref() {
            Some(discriminator) if discriminator != "0" => {
                format!("{}#{discriminator}", self.profile.username)
            }
            _ => self.profile.username.clone(),
        }
    }

    /// Link to the profile page showing `@nickname`.
    #[must_use]
    pub fn html(&self, base_url: &str) -> String {
        format!(
            "<a title=\"{}\" href=\"{}/profile/{}\">@{}</a>",
            escape_html(&self.full_name()),
            base_url.trim_end_matches('/'),
            self.id,
            escape_html(self.display_name()),
        )
    }
}

/// Who someone is, as far as the portal is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum Person {
    /// Verified member of the community
    Mensch(Member),
    /// Discord user with only the guest role
    DiscordGuest(Member),
    /// Not logged in, or no known roles
    Anonymous,
    /// Guest of one event, brought along by a Mensch
    EventGuest {
        /// Event the guest belongs to
        event: String,
        /// Guest id (< 100)
        id: Snowflake,
        /// Guest name as entered by the proxy
        name: String,
        /// Proxying Mensch
        via: Snowflake,
    },
}

impl Person {
    /// The snowflake (or guest id), if this is not an anonymous user.
    #[must_use]
    pub const fn id(&self) -> Option<Snowflake> {
        match self {
            Self::Mensch(member) | Self::DiscordGuest(member) => Some(member.id),
            Self::EventGuest { id, .. } => Some(*id),
            Self::Anonymous => None,
        }
    }

    /// Whether this is a verified member.
    #[must_use]
    pub const fn is_mensch(&self) -> bool {
        matches!(self, Self::Mensch(_))
    }

    /// The verified member, or an authorization error.
    pub fn into_mensch(self) -> Result<Member> {
        match self {
            Self::Mensch(member) => Ok(member),
            other => Err(Error::authz(format!(
                "{} is not a member of the Gefolge",
                other.display_name()
            ))),
        }
    }

    /// Name to show in lists and messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Mensch(member) | Self::DiscordGuest(member) => member.display_name().to_string(),
            Self::EventGuest { name, .. } => name.clone(),
            Self::Anonymous => "anonymous".to_string(),
        }
    }

    /// HTML representation: a profile link for Discord users, plain text otherwise.
    #[must_use]
    pub fn html(&self, base_url: &str) -> String {
        match self {
            Self::Mensch(member) | Self::DiscordGuest(member) => member.html(base_url),
            other => escape_html(&other.display_name()),
        }
    }
}

/// Escapes text for inclusion in HTML content or attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn classify(portal: &Portal, id: Snowflake, profile: Profile) -> Person {
    let member = Member { id, profile };
    if member.profile.roles.contains(&portal.config.member_role) {
        Person::Mensch(member)
    } else if member.profile.roles.contains(&portal.config.guest_role) {
        Person::DiscordGuest(member)
    } else {
        Person::Anonymous
    }
}

/// Resolves a snowflake to a person by looking at their guild roles.
///
/// Unknown snowflakes and users without a relevant role are [`Person::Anonymous`].
pub async fn by_snowflake(portal: &Portal, id: Snowflake) -> Result<Person> {
    match portal
        .store
        .load::<Profile>(Table::Profiles, &id.to_string())
        .await
    {
        Ok(profile) => Ok(classify(portal, id, profile)),
        Err(e) if e.is_not_found() => Ok(Person::Anonymous),
        Err(e) => Err(e),
    }
}

/// Loads a member who must be a verified Mensch.
pub async fn mensch(portal: &Portal, id: Snowflake) -> Result<Member> {
    by_snowflake(portal, id).await?.into_mensch()
}

/// All verified members, in snowflake order.
pub async fn menschen(portal: &Portal) -> Result<Vec<Member>> {
    let mut result = Vec::new();
    for raw in portal.store.ids(Table::Profiles).await? {
        let Ok(id) = raw.parse::<Snowflake>() else {
            debug!("Skipping profile with non-numeric id {raw:?}");
            continue;
        };
        if let Person::Mensch(member) = by_snowflake(portal, id).await? {
            result.push(member);
        }
    }
    result.sort_by_key(|member| member.id);
    Ok(result)
}

/// Creates the empty user data document if the user has none yet.
pub async fn ensure_userdata(portal: &Portal, id: Snowflake) -> Result<()> {
    if portal
        .store
        .create(Table::UserData, &id.to_string(), &UserData::default())
        .await?
    {
        debug!("Created user data for {id}");
    }
    Ok(())
}

/// Finds the Mensch or Discord guest owning an API key.
///
/// `skip` excludes one user from the search, so a key being regenerated for them cannot
/// collide with their own previous key.
pub async fn by_api_key(portal: &Portal, key: &str, skip: Option<Snowflake>) -> Result<Option<Person>> {
    for raw in portal.store.ids(Table::UserData).await? {
        let Ok(id) = raw.parse::<Snowflake>() else {
            continue;
        };
        if Some(id) == skip {
            continue;
        }
        let userdata: UserData = portal.store.load(Table::UserData, &raw).await?;
        if userdata.api_key.as_deref() == Some(key) {
            let person = by_snowflake(portal, id).await?;
            if matches!(person, Person::Mensch(_) | Person::DiscordGuest(_)) {
                return Ok(Some(person));
            }
        }
    }
    Ok(None)
}

fn generate_api_key() -> String {
    let mut rng = rand::rng();
    (0..API_KEY_LEN)
        .map(|_| char::from(API_KEY_CHARSET[rng.random_range(0..API_KEY_CHARSET.len())]))
        .collect()
}

/// Replaces a user's API key with a fresh one that no other user has.
#[instrument(skip(portal))]
pub async fn rotate_api_key(portal: &Portal, id: Snowflake) -> Result<String> {
    let key = loop {
        let candidate = generate_api_key();
        if by_api_key(portal, &candidate, Some(id)).await?.is_none() {
            break candidate;
        }
    };
    let _guard = portal.locks.lock(Table::UserData, &id.to_string()).await;
    let mut userdata: UserData = portal
        .store
        .load_or_default(Table::UserData, &id.to_string())
        .await?;
    userdata.api_key = Some(key.clone());
    portal
        .store
        .save(Table::UserData, &id.to_string(), &userdata)
        .await?;
    info!("Rotated API key of {id}");
    Ok(key)
}

/// Checks HTTP Basic credentials for the API.
///
/// The username must be `api` and the password a valid key. On failure the caller should
/// answer 401 with `WWW-Authenticate: `[`API_KEY_REALM`].
pub async fn authenticate_api_key(portal: &Portal, username: &str, password: &str) -> Result<Person> {
    if username != API_KEY_USERNAME || password.len() != API_KEY_LEN {
        return Err(Error::authz(API_KEY_REALM));
    }
    by_api_key(portal, password, None)
        .await?
        .ok_or_else(|| Error::authz(API_KEY_REALM))
}

/// Changes a member's nickname and mirrors it to Discord.
///
/// Only the member themselves and the admin may do this.
#[instrument(skip(portal))]
pub async fn set_nickname(
    portal: &Portal,
    editor: Snowflake,
    id: Snowflake,
    nick: Option<&str>,
) -> Result<()> {
    if editor != id && !portal.is_admin(editor) {
        return Err(Error::authz("you can only change your own nickname"));
    }
    let nick = nick.map(str::trim).filter(|nick| !nick.is_empty());
    {
        let _guard = portal.locks.lock(Table::Profiles, &id.to_string()).await;
        let mut profile: Profile = portal.store.load(Table::Profiles, &id.to_string()).await?;
        profile.nick = nick.map(str::to_string);
        portal
            .store
            .save(Table::Profiles, &id.to_string(), &profile)
            .await?;
    }
    portal.bridge.sync_nickname(id, nick).await;
    Ok(())
}
