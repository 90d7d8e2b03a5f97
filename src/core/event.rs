//! Event model - attendees, orga roles, nights and deposits of one event.
//!
//! An event document owns its attendee records and programm items. Attendees with an id
//! of 100 or more are Menschen (Discord snowflakes); smaller ids are guests that exist only
//! inside this event and are proxied by a Mensch (`via`). An attendee counts as signed up
//! exactly when their `signup` timestamp is set.

use crate::{
    core::{
        location::Location,
        money::Euro,
        person::{Person, Snowflake},
        portal::Portal,
        programm::{ProgrammDoc, abendessen::Dinner},
    },
    errors::{Error, Result},
    store::{KvStore, Table},
};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt};
use tracing::{info, instrument};

/// Orga roles an attendee can hold. Each role is held by at most one attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrgaRole {
    /// Finances
    Abrechnung,
    /// Booking the venue
    Buchung,
    /// Food
    Essen,
    /// Programm
    Programm,
    /// Keys
    #[serde(rename = "Schlüssel")]
    Schluessel,
}

impl OrgaRole {
    /// All roles, in display order.
    pub const ALL: [Self; 5] = [
        Self::Abrechnung,
        Self::Buchung,
        Self::Essen,
        Self::Programm,
        Self::Schluessel,
    ];
}

impl fmt::Display for OrgaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abrechnung => "Abrechnung",
            Self::Buchung => "Buchung",
            Self::Essen => "Essen",
            Self::Programm => "Programm",
            Self::Schluessel => "Schlüssel",
        })
    }
}

/// Whether an attendee is staying for a night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Going {
    /// Confirmed
    Yes,
    /// Undecided; the default for nights without an entry
    Maybe,
    /// Not staying
    No,
}

/// Per-night attendance entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Night {
    /// Attendance
    pub going: Going,
    /// When the entry was last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Diet of an attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimalProducts {
    /// Eats everything
    Yes,
    /// No meat
    Vegetarian,
    /// No animal products
    Vegan,
}

/// Food preferences of an attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    /// Diet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animal_products: Option<AnimalProducts>,
    /// Free-text allergies and intolerances
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub allergies: String,
}

/// One attendee record of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    /// Snowflake for Menschen, guest id (< 100) for guests
    pub id: Snowflake,
    /// When the signup was confirmed; absent for pending guests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signup: Option<DateTime<Utc>>,
    /// Guest name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Proxying Mensch of a guest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<Snowflake>,
    /// Orga roles held
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orga: Vec<OrgaRole>,
    /// Deposit actually paid, if it differs from the base deposit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anzahlung: Option<Euro>,
    /// Attendance per night, keyed by date
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nights: BTreeMap<NaiveDate, Night>,
    /// Food preferences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food: Option<Food>,
    /// Assigned room id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Vaccination/test status, kept as entered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covid_status: Option<Value>,
    /// Whether the house rules were accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hausordnung: Option<bool>,
    /// Fields maintained by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attendee {
    /// A fresh record for a Mensch, not yet signed up.
    #[must_use]
    pub fn mensch(id: Snowflake) -> Self {
        Self {
            id,
            signup: None,
            name: None,
            via: None,
            orga: Vec::new(),
            anzahlung: None,
            nights: BTreeMap::new(),
            food: None,
            room: None,
            covid_status: None,
            hausordnung: None,
            extra: Map::new(),
        }
    }

    /// A fresh pending guest record.
    #[must_use]
    pub fn guest(id: Snowflake, name: &str, via: Snowflake) -> Self {
        Self {
            name: Some(name.to_string()),
            via: Some(via),
            ..Self::mensch(id)
        }
    }

    /// Whether this is a guest record.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        self.id.is_guest()
    }

    /// Whether the signup has been confirmed.
    #[must_use]
    pub const fn is_signed_up(&self) -> bool {
        self.signup.is_some()
    }

    /// The Mensch whose ledger pays for this attendee: the guest's proxy, or themselves.
    #[must_use]
    pub fn payer(&self) -> Option<Snowflake> {
        if self.is_guest() { self.via } else { Some(self.id) }
    }
}

/// The stored event document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    /// Display name
    pub name: String,
    /// Local start
    pub start: NaiveDateTime,
    /// Local end
    pub end: NaiveDateTime,
    /// IANA timezone of `start` and `end`
    pub timezone: String,
    /// Location id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Discord role given to attendees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Snowflake>,
    /// Discord channel for announcements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Snowflake>,
    /// Base deposit per attendee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anzahlung: Option<Euro>,
    /// Cancellation fee the deposits must cover
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ausfall: Option<Euro>,
    /// Date from which the cancellation fee is due
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ausfall_date: Option<NaiveDate>,
    /// Manually closes signups with this reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signup_block: Option<String>,
    /// Manually closes guest signups with this reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_signup_block: Option<String>,
    /// Attendee records, Menschen and guests mixed
    #[serde(default, rename = "menschen")]
    pub attendees: Vec<Attendee>,
    /// Programm items by url part
    #[serde(default)]
    pub programm: BTreeMap<String, ProgrammDoc>,
    /// Dinner data by date
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub essen: BTreeMap<NaiveDate, Dinner>,
    /// Fields maintained by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An event document together with its id and resolved location.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event id, e.g. `2024w`
    pub id: String,
    /// The stored document
    pub data: EventDoc,
    /// The event's location, if it has one
    pub location: Option<Location>,
}

/// The current wall-clock time, compared against event-local times.
#[must_use]
pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl Event {
    /// Loads an event and its location.
    pub async fn load(portal: &Portal, id: &str) -> Result<Self> {
        let data: EventDoc = portal
            .store
            .load(Table::Events, id)
            .await
            .map_err(|e| if e.is_not_found() { Error::not_found("event", id) } else { e })?;
        Self::with_data(portal, id, data).await
    }

    async fn with_data(portal: &Portal, id: &str, data: EventDoc) -> Result<Self> {
        let location = match &data.location {
            Some(loc_id) => Some(Location::load(portal, loc_id).await?),
            None => None,
        };
        Ok(Self {
            id: id.to_string(),
            data,
            location,
        })
    }

    /// Loads all events, in id order.
    pub async fn load_all(portal: &Portal) -> Result<Vec<Self>> {
        let mut events = Vec::new();
        for id in portal.store.ids(Table::Events).await? {
            events.push(Self::load(portal, &id).await?);
        }
        Ok(events)
    }

    /// Writes the event document back.
    pub async fn save(&self, portal: &Portal) -> Result<()> {
        portal.store.save(Table::Events, &self.id, &self.data).await
    }

    /// All attendee records.
    #[must_use]
    pub fn attendees(&self) -> &[Attendee] {
        &self.data.attendees
    }

    /// Attendee records of Menschen (id ≥ 100).
    pub fn menschen(&self) -> impl Iterator<Item = &Attendee> {
        self.data.attendees.iter().filter(|a| !a.is_guest())
    }

    /// Attendee records of guests (id < 100).
    pub fn guests(&self) -> impl Iterator<Item = &Attendee> {
        self.data.attendees.iter().filter(|a| a.is_guest())
    }

    /// Confirmed attendees, ordered by signup time.
    #[must_use]
    pub fn signups(&self) -> Vec<&Attendee> {
        let mut signups: Vec<&Attendee> = self
            .data
            .attendees
            .iter()
            .filter(|a| a.is_signed_up())
            .collect();
        signups.sort_by_key(|a| a.signup);
        signups
    }

    /// Whether `id` is a confirmed attendee.
    #[must_use]
    pub fn is_signed_up(&self, id: Snowflake) -> bool {
        self.attendee(id).is_some_and(Attendee::is_signed_up)
    }

    /// The attendee record with this id.
    #[must_use]
    pub fn attendee(&self, id: Snowflake) -> Option<&Attendee> {
        self.data.attendees.iter().find(|a| a.id == id)
    }

    /// The attendee record with this id, mutably.
    pub fn attendee_mut(&mut self, id: Snowflake) -> Option<&mut Attendee> {
        self.data.attendees.iter_mut().find(|a| a.id == id)
    }

    /// A guest of this event as a [`Person`].
    #[must_use]
    pub fn guest_person(&self, id: Snowflake) -> Option<Person> {
        let attendee = self.attendee(id).filter(|a| a.is_guest())?;
        Some(Person::EventGuest {
            event: self.id.clone(),
            id,
            name: attendee.name.clone().unwrap_or_default(),
            via: attendee.via?,
        })
    }

    /// The nights of the event: every date from the start date up to (excluding) the end date.
    #[must_use]
    pub fn nights(&self) -> Vec<NaiveDate> {
        self.data
            .start
            .date()
            .iter_days()
            .take_while(|date| *date < self.data.end.date())
            .collect()
    }

    /// Base deposit, zero if the event has none.
    #[must_use]
    pub fn base_anzahlung(&self) -> Euro {
        self.data.anzahlung.unwrap_or_default()
    }

    /// Cancellation fee, zero if the event has none.
    #[must_use]
    pub fn ausfall(&self) -> Euro {
        self.data.ausfall.unwrap_or_default()
    }

    /// Deposit held for an attendee: what they paid, but never less than the base.
    #[must_use]
    pub fn paid(&self, attendee: &Attendee) -> Euro {
        let base = self.base_anzahlung();
        attendee.anzahlung.unwrap_or(base).max(base)
    }

    /// Total deposit held for all confirmed attendees.
    #[must_use]
    pub fn anzahlung_total(&self) -> Euro {
        self.signups().into_iter().map(|a| self.paid(a)).sum()
    }

    /// The attendee holding an orga role.
    #[must_use]
    pub fn orga(&self, role: OrgaRole) -> Option<&Attendee> {
        self.data.attendees.iter().find(|a| a.orga.contains(&role))
    }

    /// Roles nobody holds yet.
    #[must_use]
    pub fn orga_unassigned(&self) -> Vec<OrgaRole> {
        OrgaRole::ALL
            .into_iter()
            .filter(|role| self.orga(*role).is_none())
            .collect()
    }

    /// Whether `person` holds any orga role.
    #[must_use]
    pub fn is_orga(&self, person: Snowflake) -> bool {
        self.attendee(person).is_some_and(|a| !a.orga.is_empty())
    }

    /// Whether `person` holds the given orga role.
    #[must_use]
    pub fn is_orga_for(&self, person: Snowflake, role: OrgaRole) -> bool {
        self.orga(role).is_some_and(|a| a.id == person)
    }

    /// Night status of an attendee, `maybe` if they have not said.
    #[must_use]
    pub fn night_status(&self, attendee: &Attendee, night: NaiveDate) -> Going {
        attendee
            .nights
            .get(&night)
            .map_or(Going::Maybe, |n| n.going)
    }

    /// Confirmed attendees staying for a night.
    #[must_use]
    pub fn night_signups(&self, night: NaiveDate) -> Vec<&Attendee> {
        self.night_with_status(night, Going::Yes)
    }

    /// Confirmed attendees undecided about a night.
    #[must_use]
    pub fn night_maybes(&self, night: NaiveDate) -> Vec<&Attendee> {
        self.night_with_status(night, Going::Maybe)
    }

    fn night_with_status(&self, night: NaiveDate, going: Going) -> Vec<&Attendee> {
        self.signups()
            .into_iter()
            .filter(|a| self.night_status(a, night) == going)
            .collect()
    }

    /// Whether the event takes place online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.location.as_ref().is_some_and(|loc| loc.is_online)
    }

    /// Whether the event is over (and its data frozen).
    #[must_use]
    pub fn ended(&self, now: NaiveDateTime) -> bool {
        self.data.end < now
    }

    /// Timezone of the event (the location's if it has one).
    #[must_use]
    pub fn timezone(&self) -> &str {
        &self.data.timezone
    }

    /// Why signups are closed, or `None` if they are open.
    #[must_use]
    pub fn signup_block_reason(&self, now: NaiveDateTime) -> Option<String> {
        if self.is_online() {
            Some("Online-Events haben keine Anmeldung.".to_string())
        } else if self.ended(now) {
            Some("Dieses Event ist schon vorbei.".to_string())
        } else {
            self.data.signup_block.clone()
        }
    }

    /// Why guest signups are closed, or `None` if they are open.
    #[must_use]
    pub fn guest_signup_block_reason(&self, now: NaiveDateTime) -> Option<String> {
        self.signup_block_reason(now)
            .or_else(|| self.data.guest_signup_block.clone())
    }

    /// Whether `editor` may edit the attendee record `profile`.
    ///
    /// Orgas and the admin may edit everyone; attendees may edit themselves until the event
    /// ends; a guest's record may be edited by their proxy.
    #[must_use]
    pub fn can_edit(&self, portal: &Portal, editor: Snowflake, profile: Snowflake, now: NaiveDateTime) -> bool {
        if portal.is_admin(editor) || self.is_orga(editor) {
            return true;
        }
        if editor == profile && !self.ended(now) {
            return true;
        }
        profile.is_guest() && self.attendee(profile).is_some_and(|a| a.via == Some(editor))
    }

    /// Bank transfer reference for an attendee's deposit.
    #[must_use]
    pub fn verwendungszweck(&self, attendee: Snowflake) -> String {
        format!("anzahlung {} {attendee}", self.id)
    }

    /// Day after the end date, as needed for exclusive all-day calendar ends.
    #[must_use]
    pub fn end_date_exclusive(&self) -> NaiveDate {
        self.data
            .end
            .date()
            .checked_add_days(Days::new(1))
            .unwrap_or(self.data.end.date())
    }
}

/// Changes to an attendee record from a profile form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendeeEdits {
    /// New night statuses
    pub nights: BTreeMap<NaiveDate, Going>,
    /// New food preferences
    pub food: Option<Food>,
    /// New room assignment
    pub room: Option<String>,
    /// House rules accepted
    pub hausordnung: Option<bool>,
}

impl AttendeeEdits {
    /// Whether there is nothing to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Applies profile edits to an attendee record after validating them against the event.
pub fn apply_edits(
    event: &mut Event,
    attendee_id: Snowflake,
    edits: &AttendeeEdits,
    now: DateTime<Utc>,
) -> Result<()> {
    let nights = event.nights();
    if let Some(night) = edits.nights.keys().find(|night| !nights.contains(night)) {
        return Err(Error::validation(format!("{night} is not a night of this event")));
    }
    if let (Some(room), Some(location)) = (&edits.room, &event.location) {
        if !location.has_room(room) {
            return Err(Error::validation(format!("unknown room {room}")));
        }
    }
    let attendee = event
        .attendee_mut(attendee_id)
        .ok_or_else(|| Error::not_found("attendee", attendee_id))?;
    for (night, going) in &edits.nights {
        let entry = attendee.nights.entry(*night).or_insert(Night {
            going: *going,
            last_updated: None,
        });
        if entry.going != *going || entry.last_updated.is_none() {
            entry.going = *going;
            entry.last_updated = Some(now);
        }
    }
    if let Some(food) = &edits.food {
        attendee.food = Some(food.clone());
    }
    if let Some(room) = &edits.room {
        attendee.room = Some(room.clone());
    }
    if let Some(hausordnung) = edits.hausordnung {
        attendee.hausordnung = Some(hausordnung);
    }
    Ok(())
}

/// Creates a new event. Admin only; existing events are never overwritten.
#[instrument(skip(portal, doc))]
pub async fn create_event(portal: &Portal, editor: Snowflake, id: &str, doc: EventDoc) -> Result<Event> {
    if !portal.is_admin(editor) {
        return Err(Error::authz("only the admin can create events"));
    }
    if doc.end < doc.start {
        return Err(Error::validation("the event ends before it starts"));
    }
    if !portal.store.create(Table::Events, id, &doc).await? {
        return Err(Error::precondition(format!("event {id} already exists")));
    }
    info!("Created event {id}");
    Event::with_data(portal, id, doc).await
}

/// Edits an attendee record, enforcing [`Event::can_edit`].
#[instrument(skip(portal, edits))]
pub async fn edit_attendee(
    portal: &Portal,
    event_id: &str,
    editor: Snowflake,
    attendee: Snowflake,
    edits: &AttendeeEdits,
) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    if !event.can_edit(portal, editor, attendee, now_naive()) {
        return Err(Error::authz("you cannot edit this profile"));
    }
    apply_edits(&mut event, attendee, edits, Utc::now())?;
    event.save(portal).await?;
    Ok(event)
}

/// Hands an orga role to a confirmed attendee, or unassigns it with `None`.
///
/// Allowed for the admin and the current holder of the role.
#[instrument(skip(portal))]
pub async fn assign_orga(
    portal: &Portal,
    event_id: &str,
    editor: Snowflake,
    role: OrgaRole,
    assignee: Option<Snowflake>,
) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    if !portal.is_admin(editor) && !event.is_orga_for(editor, role) {
        return Err(Error::authz(format!("only the {role} orga can hand over this role")));
    }
    if let Some(assignee) = assignee {
        if assignee.is_guest() || !event.is_signed_up(assignee) {
            return Err(Error::precondition("orgas must be signed-up Menschen"));
        }
    }
    for attendee in &mut event.data.attendees {
        attendee.orga.retain(|r| *r != role);
        if Some(attendee.id) == assignee {
            attendee.orga.push(role);
            attendee.orga.sort();
        }
    }
    event.save(portal).await?;
    info!("{role} orga of {event_id} is now {assignee:?}");
    Ok(event)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_nights_are_half_open() {
        let event = test_event("e", None, None);
        // test events run from 2099-12-27 18:00 to 2099-12-30 10:00
        assert_eq!(
            event.nights(),
            vec![date(2099, 12, 27), date(2099, 12, 28), date(2099, 12, 29)]
        );
        let mut same_day = test_event("e", None, None);
        same_day.data.end = date(2099, 12, 27).and_time(NaiveTime::from_hms_opt(23, 0, 0).unwrap());
        assert!(same_day.nights().is_empty());
    }

    #[test]
    fn test_menschen_guests_and_signups() {
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_B, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        event
            .data
            .attendees
            .push(Attendee::guest(Snowflake::new(7), "Gast", Snowflake::new(MENSCH_A)));

        assert_eq!(event.menschen().count(), 2);
        assert_eq!(event.guests().count(), 1);
        let order: Vec<u64> = event.signups().iter().map(|a| a.id.get()).collect();
        assert_eq!(order, vec![MENSCH_B, MENSCH_A]);
        assert!(!event.is_signed_up(Snowflake::new(7)));
        assert_eq!(
            event.guest_person(Snowflake::new(7)),
            Some(Person::EventGuest {
                event: "e".to_string(),
                id: Snowflake::new(7),
                name: "Gast".to_string(),
                via: Snowflake::new(MENSCH_A),
            })
        );
    }

    #[test]
    fn test_anzahlung_total_uses_max_of_paid_and_base() {
        let mut event = test_event("e", Some(Euro::from_euros(25)), None);
        confirm_attendee(&mut event, MENSCH_A, None);
        confirm_attendee(&mut event, MENSCH_B, Some(Euro::from_euros(50)));
        confirm_attendee(&mut event, MENSCH_C, Some(Euro::from_euros(10)));
        // pending guests hold no deposit
        event
            .data
            .attendees
            .push(Attendee::guest(Snowflake::new(3), "Gast", Snowflake::new(MENSCH_A)));
        assert_eq!(event.anzahlung_total(), Euro::from_euros(100));
    }

    #[test]
    fn test_night_status_defaults_to_maybe() {
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        confirm_attendee(&mut event, MENSCH_B, None);
        let night = date(2099, 12, 28);
        event.attendee_mut(Snowflake::new(MENSCH_A)).unwrap().nights.insert(
            night,
            Night {
                going: Going::Yes,
                last_updated: None,
            },
        );
        assert_eq!(event.night_signups(night).len(), 1);
        assert_eq!(event.night_maybes(night)[0].id, Snowflake::new(MENSCH_B));
    }

    #[test]
    fn test_orga_lookup() {
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        event.attendee_mut(Snowflake::new(MENSCH_A)).unwrap().orga = vec![OrgaRole::Essen];
        assert_eq!(event.orga(OrgaRole::Essen).map(|a| a.id), Some(Snowflake::new(MENSCH_A)));
        assert_eq!(event.orga_unassigned().len(), 4);
        assert!(!event.orga_unassigned().contains(&OrgaRole::Essen));
    }

    #[test]
    fn test_block_reasons() {
        let mut event = test_event("e", None, None);
        let now = now_naive();
        assert!(event.signup_block_reason(now).is_none());
        event.data.guest_signup_block = Some("voll".to_string());
        assert!(event.signup_block_reason(now).is_none());
        assert_eq!(event.guest_signup_block_reason(now).as_deref(), Some("voll"));

        let after_end = event.data.end + chrono::Duration::hours(1);
        assert!(event.signup_block_reason(after_end).is_some());

        event.location = Some(test_location(true));
        assert!(event.signup_block_reason(now).is_some());
    }

    #[test]
    fn test_document_round_trip_is_fixed_point() {
        let json = serde_json::json!({
            "name": "Silvester",
            "start": "2099-12-27T18:00:00",
            "end": "2099-12-30T10:00:00",
            "timezone": "Europe/Berlin",
            "location": "burg",
            "anzahlung": 2500,
            "ausfall": 10000,
            "menschen": [
                {
                    "id": 86_841_168_427_495_424_u64,
                    "signup": "2099-01-01T12:00:00Z",
                    "orga": ["Abrechnung", "Schlüssel"],
                    "anzahlung": 5000,
                    "nights": {"2099-12-27": {"going": "yes", "lastUpdated": "2099-01-01T12:00:00Z"}},
                    "food": {"animalProducts": "vegan", "allergies": "Nüsse"},
                    "customField": [1, 2, 3],
                },
                {"id": 12, "name": "Gast", "via": 86_841_168_427_495_424_u64},
            ],
            "programm": {
                "werwolf": {"name": "Werwolf", "signups": [12], "limit": 10},
            },
            "essen": {"2099-12-31": {"dinner": "Raclette", "selbstversorger": []}},
            "unknownTopLevel": true,
        });
        let doc: EventDoc = serde_json::from_value(json).unwrap();
        let first = serde_json::to_value(&doc).unwrap();
        let reloaded: EventDoc = serde_json::from_value(first.clone()).unwrap();
        assert_eq!(serde_json::to_value(&reloaded).unwrap(), first);
        assert_eq!(first["menschen"][0]["customField"], serde_json::json!([1, 2, 3]));
        assert_eq!(first["unknownTopLevel"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_can_edit() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        confirm_attendee(&mut event, MENSCH_B, None);
        event
            .data
            .attendees
            .push(Attendee::guest(Snowflake::new(5), "Gast", Snowflake::new(MENSCH_A)));
        let now = now_naive();
        let (a, b, guest) = (Snowflake::new(MENSCH_A), Snowflake::new(MENSCH_B), Snowflake::new(5));

        assert!(event.can_edit(&portal, a, a, now));
        assert!(!event.can_edit(&portal, b, a, now));
        assert!(event.can_edit(&portal, a, guest, now));
        assert!(!event.can_edit(&portal, b, guest, now));
        assert!(event.can_edit(&portal, Snowflake::new(ADMIN), a, now));

        event.attendee_mut(b).unwrap().orga.push(OrgaRole::Buchung);
        assert!(event.can_edit(&portal, b, a, now));

        let after_end = event.data.end + chrono::Duration::days(1);
        assert!(!event.can_edit(&portal, a, a, after_end));
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_attendee_validates_nights() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        save_event(&portal, &event).await?;
        let a = Snowflake::new(MENSCH_A);

        let mut edits = AttendeeEdits::default();
        edits.nights.insert(date(2099, 12, 30), Going::Yes);
        let result = edit_attendee(&portal, "e", a, a, &edits).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let mut edits = AttendeeEdits {
            hausordnung: Some(true),
            ..AttendeeEdits::default()
        };
        edits.nights.insert(date(2099, 12, 29), Going::No);
        let event = edit_attendee(&portal, "e", a, a, &edits).await?;
        let record = event.attendee(a).unwrap();
        assert_eq!(record.hausordnung, Some(true));
        assert_eq!(record.nights[&date(2099, 12, 29)].going, Going::No);
        assert!(record.nights[&date(2099, 12, 29)].last_updated.is_some());

        let denied = edit_attendee(&portal, "e", Snowflake::new(MENSCH_B), a, &edits).await;
        assert!(matches!(denied, Err(Error::Authz { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_assign_orga_keeps_roles_unique() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        confirm_attendee(&mut event, MENSCH_B, None);
        save_event(&portal, &event).await?;
        let (a, b) = (Snowflake::new(MENSCH_A), Snowflake::new(MENSCH_B));

        let denied = assign_orga(&portal, "e", a, OrgaRole::Essen, Some(a)).await;
        assert!(matches!(denied, Err(Error::Authz { .. })));

        assign_orga(&portal, "e", Snowflake::new(ADMIN), OrgaRole::Essen, Some(a)).await?;
        // the holder hands the role over
        let event = assign_orga(&portal, "e", a, OrgaRole::Essen, Some(b)).await?;
        assert_eq!(event.orga(OrgaRole::Essen).map(|o| o.id), Some(b));
        assert!(event.attendee(a).unwrap().orga.is_empty());

        let not_signed_up = assign_orga(&portal, "e", b, OrgaRole::Essen, Some(Snowflake::new(MENSCH_C))).await;
        assert!(matches!(not_signed_up, Err(Error::Precondition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_event() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        let doc = test_event("neu", None, None).data;

        let denied = create_event(&portal, Snowflake::new(MENSCH_A), "neu", doc.clone()).await;
        assert!(matches!(denied, Err(Error::Authz { .. })));
        create_event(&portal, Snowflake::new(ADMIN), "neu", doc.clone()).await?;
        assert_eq!(Event::load(&portal, "neu").await?.data, doc);
        let again = create_event(&portal, Snowflake::new(ADMIN), "neu", doc).await;
        assert!(matches!(again, Err(Error::Precondition { .. })));

        let missing = Event::load(&portal, "nope").await;
        assert!(matches!(missing, Err(Error::NotFound { table, .. }) if table == "event"));
        Ok(())
    }
}
