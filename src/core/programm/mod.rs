//! Programm registry - the activities of an event.
//!
//! Programm items are stored in their event under a url part. The url part also selects the
//! variant: `custom-magic-draft`, `wichteln`, `rtww` (Werwölfe, run by an external game
//! engine), `abendessen{YYYY-MM-DD}` for the dinner of one night, and a generic item for
//! everything else. Dinners are not stored as programm items; they are derived from the
//! event's nights and its `essen` map.

pub mod abendessen;
pub mod magic;
pub mod wichteln;

use crate::{
    config::PortalConfig,
    core::{
        calendar::{CalendarEvent, CalendarTime},
        event::{Event, OrgaRole, now_naive},
        ledger::UserData,
        person::{self, Person, Snowflake},
        portal::Portal,
    },
    errors::{Error, Result},
    store::Table,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// The stored subtree of a programm item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammDoc {
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Shown below the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Responsible Mensch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orga: Option<Snowflake>,
    /// Local start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDateTime>,
    /// Local end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDateTime>,
    /// Markdown description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Signed-up attendees, in signup order
    #[serde(default)]
    pub signups: Vec<Snowflake>,
    /// Maximum number of signups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Signups closed by the orga
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
    /// Extra CSS class for the programm overview
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_class: Option<String>,
    /// Custom Magic draft: voters per set code
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub votes: BTreeMap<String, Vec<Snowflake>>,
    /// Wichteln: who gives a present to whom, assigned outside the portal
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<Snowflake, Snowflake>,
    /// Wichteln: shipping addresses for online events
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub addresses: BTreeMap<Snowflake, String>,
    /// Tournament links (`challonge`, `startgg`) and fields maintained by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgrammDoc {
    /// Whether the item links a Challonge tournament.
    #[must_use]
    pub fn has_challonge(&self) -> bool {
        self.extra.contains_key("challonge")
    }

    /// Whether the item links a start.gg tournament.
    #[must_use]
    pub fn has_startgg(&self) -> bool {
        self.extra.contains_key("startgg")
    }
}

/// Which variant a programm item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammKind {
    /// Plain item
    Generic,
    /// Dinner of one night
    Abendessen(NaiveDate),
    /// Custom Magic draft with set voting
    CustomMagicDraft,
    /// Secret Santa
    Wichteln,
    /// Werwölfe
    Werewolf,
}

impl ProgrammKind {
    /// Dispatches on the url part.
    #[must_use]
    pub fn from_url_part(url_part: &str) -> Self {
        match url_part {
            magic::URL_PART => Self::CustomMagicDraft,
            wichteln::URL_PART => Self::Wichteln,
            "rtww" => Self::Werewolf,
            _ => abendessen::parse_url_part(url_part).map_or(Self::Generic, Self::Abendessen),
        }
    }
}

/// Validates a url part for a new stored item.
fn validate_url_part(url_part: &str) -> Result<()> {
    let valid = !url_part.is_empty()
        && url_part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(Error::validation(format!(
            "{url_part:?} is not a valid url part (lowercase letters, digits and dashes)"
        )));
    }
    if abendessen::parse_url_part(url_part).is_some() {
        return Err(Error::validation("dinners are created automatically"));
    }
    Ok(())
}

/// A programm item of an event, resolved to its variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Programmpunkt {
    /// Key within the event
    pub url_part: String,
    /// Variant
    pub kind: ProgrammKind,
    /// Stored (or, for dinners, derived) data
    pub doc: ProgrammDoc,
}

impl Programmpunkt {
    /// Looks up an item of an event.
    pub fn get(event: &Event, url_part: &str) -> Result<Self> {
        let kind = ProgrammKind::from_url_part(url_part);
        if let ProgrammKind::Abendessen(date) = kind {
            return abendessen::item(event, date).ok_or_else(|| Error::not_found("programm", url_part));
        }
        let doc = event
            .data
            .programm
            .get(url_part)
            .cloned()
            .ok_or_else(|| Error::not_found("programm", url_part))?;
        Ok(Self {
            url_part: url_part.to_string(),
            kind,
            doc,
        })
    }

    /// All items of an event: the stored ones in url order, then one dinner per night.
    #[must_use]
    pub fn all(event: &Event) -> Vec<Self> {
        let mut items: Vec<Self> = event
            .data
            .programm
            .iter()
            .filter(|(url_part, _)| abendessen::parse_url_part(url_part).is_none())
            .map(|(url_part, doc)| Self {
                url_part: url_part.clone(),
                kind: ProgrammKind::from_url_part(url_part),
                doc: doc.clone(),
            })
            .collect();
        items.extend(
            event
                .nights()
                .into_iter()
                .filter_map(|date| abendessen::item(event, date)),
        );
        items
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        if let Some(name) = &self.doc.name {
            return name.clone();
        }
        match self.kind {
            ProgrammKind::Abendessen(_) => "Abendessen".to_string(),
            ProgrammKind::CustomMagicDraft => "Custom Magic Draft".to_string(),
            ProgrammKind::Wichteln => "Wichteln".to_string(),
            ProgrammKind::Werewolf => "Werwölfe".to_string(),
            ProgrammKind::Generic => self.url_part.clone(),
        }
    }

    /// The responsible Mensch.
    #[must_use]
    pub fn orga(&self, config: &PortalConfig) -> Option<Snowflake> {
        match self.kind {
            ProgrammKind::CustomMagicDraft => Some(config.magic_orga),
            _ => self.doc.orga,
        }
    }

    /// Who is signed up, in signup order.
    #[must_use]
    pub fn signups(&self, config: &PortalConfig) -> Vec<Snowflake> {
        match self.kind {
            ProgrammKind::CustomMagicDraft => magic::signups(&self.doc, config),
            _ => self.doc.signups.clone(),
        }
    }

    /// Description, with the drafted set's blurb for a custom Magic draft.
    #[must_use]
    pub fn description(&self, event: &Event, config: &PortalConfig) -> Option<String> {
        match self.kind {
            ProgrammKind::CustomMagicDraft => magic::description(&self.doc, event, config),
            _ => self.doc.description.clone(),
        }
    }

    /// Page of the item.
    #[must_use]
    pub fn url(&self, event: &Event, base_url: &str) -> String {
        format!(
            "{}/event/{}/programm/{}",
            base_url.trim_end_matches('/'),
            event.id,
            self.url_part
        )
    }

    /// Whether `editor` may edit the item.
    ///
    /// The admin always may; the Programm orga may even after the event for archival; other
    /// than that only the item's orga may, and only until the event ends.
    #[must_use]
    pub fn can_edit(&self, portal: &Portal, event: &Event, editor: Snowflake, now: NaiveDateTime) -> bool {
        if portal.is_admin(editor) || event.is_orga_for(editor, OrgaRole::Programm) {
            return true;
        }
        !event.ended(now) && self.orga(&portal.config) == Some(editor)
    }

    /// Why `editor` cannot sign `person` up, or `None` if they can.
    pub async fn signup_block(
        &self,
        portal: &Portal,
        event: &Event,
        editor: Snowflake,
        person: Snowflake,
        now: NaiveDateTime,
    ) -> Result<Option<String>> {
        if portal.is_admin(editor) {
            return Ok(None);
        }
        if event.ended(now) {
            return Ok(Some("Dieses Event ist schon vorbei.".to_string()));
        }
        let via = event.attendee(person).and_then(|a| a.via);
        if editor != person && via != Some(editor) && !event.is_orga_for(editor, OrgaRole::Programm) {
            return Ok(Some("Du kannst nur dich selbst und deine Gäste anmelden.".to_string()));
        }
        let attending = if event.is_online() {
            matches!(person::by_snowflake(portal, person).await?, Person::Mensch(_))
        } else {
            event.is_signed_up(person)
        };
        if !attending {
            return Ok(Some("Nicht für das Event angemeldet.".to_string()));
        }
        let signups = self.signups(&portal.config);
        if signups.contains(&person) {
            return Ok(Some("Schon angemeldet.".to_string()));
        }
        if let ProgrammKind::Abendessen(date) = self.kind {
            if let Some(attendee) = event.attendee(person) {
                if event.night_status(attendee, date) == crate::core::event::Going::No {
                    return Ok(Some("Für diese Nacht nicht angemeldet.".to_string()));
                }
            }
        }
        if self.doc.limit.is_some_and(|limit| signups.len() >= limit) {
            return Ok(Some("Keine Plätze mehr frei.".to_string()));
        }
        if self.doc.closed == Some(true) {
            return Ok(Some("Die Anmeldung ist geschlossen.".to_string()));
        }
        Ok(None)
    }

    /// Whether `editor` can sign `person` up.
    pub async fn can_signup(
        &self,
        portal: &Portal,
        event: &Event,
        editor: Snowflake,
        person: Snowflake,
        now: NaiveDateTime,
    ) -> Result<bool> {
        Ok(self
            .signup_block(portal, event, editor, person, now)
            .await?
            .is_none())
    }

    /// Calendar entries of the item; none if it has no fixed time.
    #[must_use]
    pub fn calendar_events(&self, event: &Event, base_url: &str) -> Vec<CalendarEvent> {
        let (Some(start), Some(end)) = (self.doc.start, self.doc.end) else {
            return Vec::new();
        };
        let location = event.location.as_ref().and_then(|loc| loc.address.clone());
        let url = self.url(event, base_url);
        let entry = |slot: usize, summary: String, start: NaiveDateTime, end: NaiveDateTime| CalendarEvent {
            uid: CalendarEvent::uid(&event.id, Some(&self.url_part), slot),
            summary,
            start: CalendarTime::local(start, event.timezone()),
            end: CalendarTime::local(end, event.timezone()),
            location: location.clone(),
            url: Some(url.clone()),
        };
        let mut entries = vec![entry(0, self.name(), start, end)];
        if let ProgrammKind::Abendessen(date) = self.kind {
            if let Some((prep_start, prep_end)) = abendessen::vorbereitung(date) {
                entries.push(entry(1, abendessen::VORBEREITUNG.to_string(), prep_start, prep_end));
            }
        }
        entries
    }

    /// The variant-specific fields of the signup form for `editor`.
    #[must_use]
    pub fn form_fields(&self, event: &Event, config: &PortalConfig, editor: Snowflake, userdata: &UserData) -> Vec<FormField> {
        let mut fields = Vec::new();
        if self.doc.has_challonge() {
            fields.push(FormField::ChallongeUsername {
                current: userdata.challonge.clone(),
            });
        }
        if self.doc.has_startgg() {
            fields.push(FormField::StartggSlug {
                current: userdata.startgg.clone(),
            });
        }
        match self.kind {
            ProgrammKind::CustomMagicDraft => fields.extend(magic::vote_fields(&self.doc, event, config, editor)),
            ProgrammKind::Wichteln if event.is_online() => fields.push(FormField::WichtelnAddress {
                current: self.doc.addresses.get(&editor).cloned(),
            }),
            _ => {}
        }
        fields
    }
}

/// A variant-specific field of a programm signup form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    /// Challonge username for tournament items
    ChallongeUsername {
        /// Value on file
        current: Option<String>,
    },
    /// start.gg user slug for tournament items
    StartggSlug {
        /// Value on file
        current: Option<String>,
    },
    /// One checkbox per draftable Magic set
    MagicSetVote {
        /// Set code
        code: String,
        /// Set name
        name: String,
        /// Whether the editor has voted for it
        checked: bool,
    },
    /// Shipping address for an online Wichteln
    WichtelnAddress {
        /// Address on file
        current: Option<String>,
    },
}

/// Input from a programm signup form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupInput {
    /// Challonge username
    pub challonge: Option<String>,
    /// start.gg user slug
    pub startgg: Option<String>,
    /// Wichteln shipping address
    pub address: Option<String>,
}

/// Changes from a programm edit form. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgrammEdits {
    /// New name
    pub name: Option<String>,
    /// New subtitle
    pub subtitle: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New orga
    pub orga: Option<Snowflake>,
    /// New start
    pub start: Option<NaiveDateTime>,
    /// New end
    pub end: Option<NaiveDateTime>,
    /// New signup limit
    pub limit: Option<usize>,
    /// Open or close signups
    pub closed: Option<bool>,
}

fn check_times(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<()> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(Error::validation("the item ends before it starts")),
        _ => Ok(()),
    }
}

/// Adds a stored item to an event. Programm orga or admin, and only before the event ends.
#[instrument(skip(portal, doc))]
pub async fn create_programmpunkt(
    portal: &Portal,
    event_id: &str,
    editor: Snowflake,
    url_part: &str,
    doc: ProgrammDoc,
) -> Result<Event> {
    validate_url_part(url_part)?;
    check_times(doc.start, doc.end)?;
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    if !portal.is_admin(editor) && !event.is_orga_for(editor, OrgaRole::Programm) {
        return Err(Error::authz("only the Programm orga can add programm items"));
    }
    if event.ended(now_naive()) {
        return Err(Error::precondition("this event is already over"));
    }
    if event.data.programm.contains_key(url_part) {
        return Err(Error::precondition(format!("there already is a programm item {url_part}")));
    }
    event.data.programm.insert(url_part.to_string(), doc);
    event.save(portal).await?;
    info!("Added programm item {url_part} to {event_id}");
    Ok(event)
}

/// Edits an item, enforcing [`Programmpunkt::can_edit`].
#[instrument(skip(portal, edits))]
pub async fn edit_programmpunkt(
    portal: &Portal,
    event_id: &str,
    editor: Snowflake,
    url_part: &str,
    edits: &ProgrammEdits,
) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    let item = Programmpunkt::get(&event, url_part)?;
    if !item.can_edit(portal, &event, editor, now_naive()) {
        return Err(Error::authz("you cannot edit this programm item"));
    }
    match item.kind {
        ProgrammKind::Abendessen(date) => abendessen::edit(&mut event, date, edits)?,
        kind => {
            if kind == ProgrammKind::CustomMagicDraft && edits.orga.is_some_and(|orga| orga != portal.config.magic_orga) {
                return Err(Error::precondition("the custom Magic draft orga cannot be changed"));
            }
            let mut doc = item.doc;
            if let Some(name) = &edits.name {
                doc.name = Some(name.clone());
            }
            if let Some(subtitle) = &edits.subtitle {
                doc.subtitle = Some(subtitle.clone());
            }
            if let Some(description) = &edits.description {
                doc.description = Some(description.clone());
            }
            if let Some(orga) = edits.orga {
                doc.orga = Some(orga);
            }
            doc.start = edits.start.or(doc.start);
            doc.end = edits.end.or(doc.end);
            check_times(doc.start, doc.end)?;
            if let Some(limit) = edits.limit {
                doc.limit = Some(limit);
            }
            if let Some(closed) = edits.closed {
                doc.closed = Some(closed);
            }
            event.data.programm.insert(url_part.to_string(), doc);
        }
    }
    event.save(portal).await?;
    Ok(event)
}

/// Removes a stored item. Programm orga or admin, and only before the event ends.
#[instrument(skip(portal))]
pub async fn delete_programmpunkt(portal: &Portal, event_id: &str, editor: Snowflake, url_part: &str) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    let item = Programmpunkt::get(&event, url_part)?;
    if !portal.is_admin(editor) && !event.is_orga_for(editor, OrgaRole::Programm) {
        return Err(Error::authz("only the Programm orga can delete programm items"));
    }
    if event.ended(now_naive()) {
        return Err(Error::precondition("programm items of past events are kept"));
    }
    if matches!(item.kind, ProgrammKind::Abendessen(_)) {
        return Err(Error::precondition("dinners cannot be deleted"));
    }
    event.data.programm.remove(url_part);
    event.save(portal).await?;
    info!("Deleted programm item {url_part} of {event_id}");
    Ok(event)
}

/// Signs `person` up for an item, storing the variant-specific form input.
#[instrument(skip(portal, input))]
pub async fn signup_programmpunkt(
    portal: &Portal,
    event_id: &str,
    editor: Snowflake,
    url_part: &str,
    person: Snowflake,
    input: &SignupInput,
) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    let item = Programmpunkt::get(&event, url_part)?;
    if let Some(reason) = item.signup_block(portal, &event, editor, person, now_naive()).await? {
        return Err(Error::precondition(reason));
    }
    match item.kind {
        ProgrammKind::Abendessen(date) => abendessen::set_selbstversorger(&mut event, date, person, false),
        kind => {
            let mut doc = item.doc.clone();
            if kind == ProgrammKind::Wichteln {
                if let Some(address) = &input.address {
                    wichteln::set_address(&event, &mut doc, person, address)?;
                }
            }
            if !doc.signups.contains(&person) {
                doc.signups.push(person);
            }
            event.data.programm.insert(url_part.to_string(), doc);
        }
    }
    // the event change is validated, account data is only written for a signup that happens
    store_tournament_accounts(portal, &item.doc, person, input).await?;
    event.save(portal).await?;
    info!("{person} signed up for {url_part} at {event_id}");
    if let Some(orga) = item.orga(&portal.config).filter(|orga| *orga != person) {
        let name = match event.guest_person(person) {
            Some(guest) => guest.display_name(),
            None => person::by_snowflake(portal, person)
                .await
                .map_or_else(|_| person.to_string(), |found| found.display_name()),
        };
        portal
            .bridge
            .notify_dm(orga, &format!("{name} hat sich für {} angemeldet.", item.name()))
            .await;
    }
    Ok(event)
}

async fn store_tournament_accounts(portal: &Portal, doc: &ProgrammDoc, person: Snowflake, input: &SignupInput) -> Result<()> {
    let wants_challonge = doc.has_challonge();
    let wants_startgg = doc.has_startgg();
    if !wants_challonge && !wants_startgg {
        return Ok(());
    }
    if person.is_guest() {
        return Err(Error::precondition("guests cannot join tournaments"));
    }
    let id = person.to_string();
    let _guard = portal.locks.lock(Table::UserData, &id).await;
    let mut userdata: UserData = portal.store.load_or_default(Table::UserData, &id).await?;
    let clean = |value: &Option<String>| value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
    if wants_challonge {
        userdata.challonge = clean(&input.challonge).or(userdata.challonge);
        if userdata.challonge.is_none() {
            return Err(Error::validation("a Challonge username is required"));
        }
    }
    if wants_startgg {
        userdata.startgg = clean(&input.startgg).or(userdata.startgg);
        if userdata.startgg.is_none() {
            return Err(Error::validation("a start.gg user slug is required"));
        }
    }
    portal.store.save(Table::UserData, &id, &userdata).await
}

/// Takes `person` off an item.
///
/// Allowed for the person, the proxy of a guest, the Programm orga and the admin. Leaving
/// a dinner marks the person as self-catering for that night.
#[instrument(skip(portal))]
pub async fn leave_programmpunkt(
    portal: &Portal,
    event_id: &str,
    editor: Snowflake,
    url_part: &str,
    person: Snowflake,
) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    let item = Programmpunkt::get(&event, url_part)?;
    let via = event.attendee(person).and_then(|a| a.via);
    let allowed = portal.is_admin(editor)
        || editor == person
        || via == Some(editor)
        || event.is_orga_for(editor, OrgaRole::Programm);
    if !allowed {
        return Err(Error::authz("you can only sign yourself and your guests out"));
    }
    if event.ended(now_naive()) && !portal.is_admin(editor) {
        return Err(Error::precondition("this event is already over"));
    }
    if !item.signups(&portal.config).contains(&person) {
        return Err(Error::precondition("not signed up"));
    }
    match item.kind {
        ProgrammKind::Abendessen(date) => abendessen::set_selbstversorger(&mut event, date, person, true),
        ProgrammKind::CustomMagicDraft if person == portal.config.magic_orga => {
            return Err(Error::precondition("the orga cannot leave the draft"));
        }
        _ => {
            let mut doc = item.doc;
            doc.signups.retain(|id| *id != person);
            event.data.programm.insert(url_part.to_string(), doc);
        }
    }
    event.save(portal).await?;
    Ok(event)
}
