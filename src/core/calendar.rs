//! Calendar projection - events and programm items as iCalendar feeds.

use crate::{
    config::PortalConfig,
    core::{event::Event, person::Snowflake, portal::Portal, programm::Programmpunkt},
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveDateTime};

/// `PRODID` of every feed.
pub const PRODID: &str = "-//Gefolge//gefolge.org//DE";

/// Calendar name of the personal signups feed.
pub const SIGNUPS_CALENDAR_NAME: &str = "gefolge.org";

/// Content type of the feeds.
pub const CONTENT_TYPE: &str = "text/calendar";

const MAX_LINE_OCTETS: usize = 75;
const DATE_FORMAT: &str = "%Y%m%d";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Start or end of a calendar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarTime {
    /// All-day value
    Date(NaiveDate),
    /// Wall-clock time in a named timezone
    Local {
        /// Local date and time
        time: NaiveDateTime,
        /// IANA timezone
        tzid: String,
    },
}

impl CalendarTime {
    /// A local time in `tzid`.
    #[must_use]
    pub fn local(time: NaiveDateTime, tzid: &str) -> Self {
        Self::Local {
            time,
            tzid: tzid.to_string(),
        }
    }

    fn sort_key(&self) -> NaiveDateTime {
        match self {
            Self::Date(date) => date.and_time(chrono::NaiveTime::MIN),
            Self::Local { time, .. } => *time,
        }
    }

    fn content_line(&self, name: &str) -> String {
        match self {
            Self::Date(date) => format!("{name};VALUE=DATE:{}", date.format(DATE_FORMAT)),
            Self::Local { time, tzid } => format!("{name};TZID={tzid}:{}", time.format(LOCAL_FORMAT)),
        }
    }

    fn parse(params: &[&str], value: &str) -> Result<Self> {
        if params.contains(&"VALUE=DATE") {
            return NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map(Self::Date)
                .map_err(|e| Error::validation(format!("bad date {value:?}: {e}")));
        }
        let tzid = params
            .iter()
            .find_map(|param| param.strip_prefix("TZID="))
            .ok_or_else(|| Error::validation("timed values need a TZID"))?;
        let time = NaiveDateTime::parse_from_str(value, LOCAL_FORMAT)
            .map_err(|e| Error::validation(format!("bad date-time {value:?}: {e}")))?;
        Ok(Self::local(time, tzid))
    }
}

/// One `VEVENT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// Stable unique id
    pub uid: String,
    /// Title
    pub summary: String,
    /// Start
    pub start: CalendarTime,
    /// End (exclusive)
    pub end: CalendarTime,
    /// Postal address of the venue
    pub location: Option<String>,
    /// Page of the event or programm item
    pub url: Option<String>,
}

impl CalendarEvent {
    /// `gefolge-event-{event}[-{url_part}]-{slot}@gefolge.org`
    #[must_use]
    pub fn uid(event_id: &str, url_part: Option<&str>, slot: usize) -> String {
        match url_part {
            Some(url_part) => format!("gefolge-event-{event_id}-{url_part}-{slot}@gefolge.org"),
            None => format!("gefolge-event-{event_id}-{slot}@gefolge.org"),
        }
    }

    fn sort_key(&self) -> (NaiveDateTime, NaiveDateTime, &str) {
        (self.start.sort_key(), self.end.sort_key(), &self.summary)
    }
}

/// A named, sorted list of calendar entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    /// `X-WR-CALNAME`
    pub name: String,
    /// Entries ordered by start, end and title
    pub events: Vec<CalendarEvent>,
}

impl Calendar {
    /// Builds a calendar, sorting the entries.
    #[must_use]
    pub fn new(name: impl Into<String>, mut events: Vec<CalendarEvent>) -> Self {
        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self {
            name: name.into(),
            events,
        }
    }

    /// Serialises to iCalendar text with CRLF line endings and folded long lines.
    #[must_use]
    pub fn to_ical(&self) -> String {
        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            format!("PRODID:{PRODID}"),
            format!("X-WR-CALNAME:{}", escape_text(&self.name)),
        ];
        for event in &self.events {
            lines.push("BEGIN:VEVENT".to_string());
            lines.push(format!("UID:{}", event.uid));
            lines.push(format!("SUMMARY:{}", escape_text(&event.summary)));
            lines.push(event.start.content_line("DTSTART"));
            lines.push(event.end.content_line("DTEND"));
            if let Some(location) = &event.location {
                lines.push(format!("LOCATION:{}", escape_text(location)));
            }
            if let Some(url) = &event.url {
                lines.push(format!("URL:{url}"));
            }
            lines.push("END:VEVENT".to_string());
        }
        lines.push("END:VCALENDAR".to_string());
        let mut ical = String::new();
        for line in lines {
            ical.push_str(&fold(&line));
            ical.push_str("\r\n");
        }
        ical
    }

    /// Parses the iCalendar subset written by [`Calendar::to_ical`]. Unknown properties are
    /// skipped; entry order is kept.
    pub fn parse(ical: &str) -> Result<Self> {
        let mut name = String::new();
        let mut events = Vec::new();
        let mut current: Option<PartialEvent> = None;
        for line in unfold(ical) {
            if line == "BEGIN:VEVENT" {
                current = Some(PartialEvent::default());
                continue;
            }
            if line == "END:VEVENT" {
                let partial = current
                    .take()
                    .ok_or_else(|| Error::validation("END:VEVENT without BEGIN"))?;
                events.push(partial.finish()?);
                continue;
            }
            let (head, value) = line
                .split_once(':')
                .ok_or_else(|| Error::validation(format!("malformed content line {line:?}")))?;
            let mut parts = head.split(';');
            let prop = parts.next().unwrap_or_default();
            let params: Vec<&str> = parts.collect();
            match (prop, current.as_mut()) {
                ("X-WR-CALNAME", None) => name = unescape_text(value),
                ("UID", Some(event)) => event.uid = Some(value.to_string()),
                ("SUMMARY", Some(event)) => event.summary = Some(unescape_text(value)),
                ("DTSTART", Some(event)) => event.start = Some(CalendarTime::parse(&params, value)?),
                ("DTEND", Some(event)) => event.end = Some(CalendarTime::parse(&params, value)?),
                ("LOCATION", Some(event)) => event.location = Some(unescape_text(value)),
                ("URL", Some(event)) => event.url = Some(value.to_string()),
                _ => {}
            }
        }
        if current.is_some() {
            return Err(Error::validation("unterminated VEVENT"));
        }
        Ok(Self { name, events })
    }
}

#[derive(Default)]
struct PartialEvent {
    uid: Option<String>,
    summary: Option<String>,
    start: Option<CalendarTime>,
    end: Option<CalendarTime>,
    location: Option<String>,
    url: Option<String>,
}

impl PartialEvent {
    fn finish(self) -> Result<CalendarEvent> {
        let missing = |prop: &str| Error::validation(format!("VEVENT without {prop}"));
        Ok(CalendarEvent {
            uid: self.uid.ok_or_else(|| missing("UID"))?,
            summary: self.summary.ok_or_else(|| missing("SUMMARY"))?,
            start: self.start.ok_or_else(|| missing("DTSTART"))?,
            end: self.end.ok_or_else(|| missing("DTEND"))?,
            location: self.location,
            url: self.url,
        })
    }
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape_text(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => unescaped.push('\n'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Splits a content line into chunks of at most 75 octets, continuation lines starting
/// with a space.
fn fold(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut octets = 0;
    for c in line.chars() {
        if octets + c.len_utf8() > MAX_LINE_OCTETS {
            folded.push_str("\r\n ");
            octets = 1;
        }
        folded.push(c);
        octets += c.len_utf8();
    }
    folded
}

fn unfold(ical: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ical.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match (raw.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(continuation), Some(last)) => last.push_str(continuation),
            _ if raw.is_empty() => {}
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

/// The all-day entry of the event itself.
#[must_use]
pub fn event_entry(event: &Event, base_url: &str) -> CalendarEvent {
    CalendarEvent {
        uid: CalendarEvent::uid(&event.id, None, 0),
        summary: event.data.name.clone(),
        start: CalendarTime::Date(event.data.start.date()),
        end: CalendarTime::Date(event.end_date_exclusive()),
        location: event.location.as_ref().and_then(|loc| loc.address.clone()),
        url: Some(format!("{}/event/{}", base_url.trim_end_matches('/'), event.id)),
    }
}

/// The event and all its programm items.
#[must_use]
pub fn event_calendar(event: &Event, config: &PortalConfig) -> Calendar {
    let mut entries = vec![event_entry(event, &config.base_url)];
    for item in Programmpunkt::all(event) {
        entries.extend(item.calendar_events(event, &config.base_url));
    }
    Calendar::new(event.data.name.clone(), entries)
}

/// The personal feed of `person`: events they are signed up for, with the programm items
/// they organise or are signed up for.
pub async fn signups_calendar(portal: &Portal, person: Snowflake) -> Result<Calendar> {
    let config = &portal.config;
    let mut entries = Vec::new();
    for event in Event::load_all(portal).await? {
        if !event.is_signed_up(person) {
            continue;
        }
        entries.push(event_entry(&event, &config.base_url));
        for item in Programmpunkt::all(&event) {
            if item.orga(config) == Some(person) || item.signups(config).contains(&person) {
                entries.extend(item.calendar_events(&event, &config.base_url));
            }
        }
    }
    Ok(Calendar::new(SIGNUPS_CALENDAR_NAME, entries))
}
