//! Dinners, one per night of an in-person event.

use super::{ProgrammDoc, ProgrammEdits, ProgrammKind, Programmpunkt};
use crate::{
    core::{
        event::{Event, Going, OrgaRole},
        person::Snowflake,
    },
    errors::{Error, Result},
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Url parts of dinners are this prefix followed by the date.
pub const URL_PREFIX: &str = "abendessen";

/// Name of the extra entry before the New Year's Eve buffet.
pub const VORBEREITUNG: &str = "Silvesterbuffet: Vorbereitung";

/// Stored dinner data of one night (`essen[date]` of the event).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dinner {
    /// What is being served
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dinner: Option<String>,
    /// Cook for this night, if not the Essen orga
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orga: Option<Snowflake>,
    /// Attendees taking care of their own dinner
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selbstversorger: Vec<Snowflake>,
    /// Fields maintained by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Url part of the dinner on `date`.
#[must_use]
pub fn url_part(date: NaiveDate) -> String {
    format!("{URL_PREFIX}{}", date.format("%Y-%m-%d"))
}

/// The date of a dinner url part (`abendessenYYYY-MM-DD`).
#[must_use]
pub fn parse_url_part(url_part: &str) -> Option<NaiveDate> {
    let date = url_part.strip_prefix(URL_PREFIX)?;
    let shape_ok = date.len() == 10
        && date.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn is_silvester(date: NaiveDate) -> bool {
    date.month() == 12 && date.day() == 31
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
}

/// Local start and end of the dinner: 19:00 to 20:00, or the buffet from 22:00 to 23:55 on
/// New Year's Eve.
#[must_use]
pub fn times(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    if is_silvester(date) {
        (at(date, 22, 0), at(date, 23, 55))
    } else {
        (at(date, 19, 0), at(date, 20, 0))
    }
}

/// The buffet preparation slot on New Year's Eve: the four hours before the buffet.
#[must_use]
pub fn vorbereitung(date: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
    is_silvester(date).then(|| {
        let (start, _) = times(date);
        (start - Duration::hours(4), start)
    })
}

/// Attendees eating along: confirmed attendees staying (or maybe staying) that night,
/// minus the self-caterers.
#[must_use]
pub fn signups(event: &Event, date: NaiveDate) -> Vec<Snowflake> {
    let selbstversorger = event
        .data
        .essen
        .get(&date)
        .map(|dinner| dinner.selbstversorger.as_slice())
        .unwrap_or_default();
    event
        .signups()
        .into_iter()
        .filter(|a| matches!(event.night_status(a, date), Going::Yes | Going::Maybe))
        .map(|a| a.id)
        .filter(|id| !selbstversorger.contains(id))
        .collect()
}

/// The dinner of `date` as a programm item, if the event has that night and is not online.
#[must_use]
pub fn item(event: &Event, date: NaiveDate) -> Option<Programmpunkt> {
    if event.is_online() || !event.nights().contains(&date) {
        return None;
    }
    let stored = event.data.essen.get(&date);
    let (start, end) = times(date);
    Some(Programmpunkt {
        url_part: url_part(date),
        kind: ProgrammKind::Abendessen(date),
        doc: ProgrammDoc {
            orga: stored
                .and_then(|dinner| dinner.orga)
                .or_else(|| event.orga(OrgaRole::Essen).map(|a| a.id)),
            start: Some(start),
            end: Some(end),
            description: stored.and_then(|dinner| dinner.dinner.clone()),
            signups: signups(event, date),
            ..ProgrammDoc::default()
        },
    })
}

/// Applies edits to the dinner of `date`. Only the menu and the cook can change.
pub(super) fn edit(event: &mut Event, date: NaiveDate, edits: &ProgrammEdits) -> Result<()> {
    let fixed = edits.name.is_some()
        || edits.subtitle.is_some()
        || edits.start.is_some()
        || edits.end.is_some()
        || edits.limit.is_some()
        || edits.closed.is_some();
    if fixed {
        return Err(Error::validation("only the menu and the cook of a dinner can be changed"));
    }
    let dinner = event.data.essen.entry(date).or_default();
    if let Some(description) = &edits.description {
        dinner.dinner = Some(description.clone());
    }
    if let Some(orga) = edits.orga {
        dinner.orga = Some(orga);
    }
    Ok(())
}

/// Marks `person` as self-catering on `date`, or takes them off that list.
pub(super) fn set_selbstversorger(event: &mut Event, date: NaiveDate, person: Snowflake, selbstversorger: bool) {
    let dinner = event.data.essen.entry(date).or_default();
    dinner.selbstversorger.retain(|id| *id != person);
    if selbstversorger {
        dinner.selbstversorger.push(person);
    }
}
