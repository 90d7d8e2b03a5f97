//! Wichteln (Secret Santa).
//!
//! Who gives a present to whom is decided outside the portal and written into `targets`;
//! the portal only shows each participant their target and collects shipping addresses
//! for online events.

use super::{ProgrammDoc, Programmpunkt};
use crate::{
    core::{
        event::Event,
        person::{self, Snowflake, escape_html},
        portal::Portal,
    },
    errors::{Error, Result},
};

/// Url part of the Wichteln item.
pub const URL_PART: &str = "wichteln";

/// Whom a participant gives a present to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WichtelTarget {
    /// The recipient
    pub id: Snowflake,
    /// Display name of the recipient
    pub name: String,
    /// Shipping address, for online events
    pub address: Option<String>,
}

impl WichtelTarget {
    /// The target wrapped in a spoiler that is revealed on click.
    #[must_use]
    pub fn spoiler_html(&self) -> String {
        let mut content = escape_html(&self.name);
        if let Some(address) = &self.address {
            content.push_str("<br />");
            content.push_str(&escape_html(address).replace('\n', "<br />"));
        }
        format!("<span class=\"spoiler\">{content}</span>")
    }
}

/// Stores a shipping address. Only online events collect addresses.
pub(super) fn set_address(event: &Event, doc: &mut ProgrammDoc, person: Snowflake, address: &str) -> Result<()> {
    if !event.is_online() {
        return Err(Error::validation("addresses are only needed for online events"));
    }
    let address = address.trim();
    if address.is_empty() {
        doc.addresses.remove(&person);
    } else {
        doc.addresses.insert(person, address.to_string());
    }
    Ok(())
}

/// The target of `viewer`, if targets have been assigned.
pub async fn target(portal: &Portal, event: &Event, viewer: Snowflake) -> Result<Option<WichtelTarget>> {
    let item = Programmpunkt::get(event, URL_PART)?;
    let Some(&id) = item.doc.targets.get(&viewer) else {
        return Ok(None);
    };
    let name = match event.guest_person(id) {
        Some(guest) => guest.display_name(),
        None => person::by_snowflake(portal, id).await?.display_name(),
    };
    Ok(Some(WichtelTarget {
        id,
        name,
        address: item.doc.addresses.get(&id).cloned(),
    }))
}
