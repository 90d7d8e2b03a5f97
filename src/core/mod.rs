//! Core portal logic, independent of the chat framework.

/// iCalendar feeds for events and signups
pub mod calendar;
/// Events, attendees, orga roles and nights
pub mod event;
/// Per-user credit ledger
pub mod ledger;
/// Event locations and rooms
pub mod location;
/// Euro amounts in cents
pub mod money;
/// Discord profiles, Menschen and guests
pub mod person;
/// Shared services for all operations
pub mod portal;
/// Programm items: generic, dinners, Magic draft, Wichteln, Werwölfe
pub mod programm;
/// Event signups, guest confirmation and deposit rebalancing
pub mod signup;
