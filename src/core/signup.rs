//! Signup engine - member signup, two-step guest signup and deposit rebalancing.
//!
//! Every operation here holds the event lock for its whole read-modify-write and posts
//! ledger entries while holding it (event lock first, then the ledger lock inside
//! [`ledger::record`]).

use crate::{
    core::{
        event::{Attendee, AttendeeEdits, Event, OrgaRole, apply_edits, now_naive},
        ledger::{self, Transaction},
        money::Euro,
        person::{self, GUEST_ID_LIMIT, Snowflake},
        portal::Portal,
    },
    errors::{Error, Result},
    store::Table,
};
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

/// A surplus deposit paid back by [`rebalance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    /// Attendee whose deposit was reduced
    pub attendee: Snowflake,
    /// Ledger the refund is posted to (the proxy for guests)
    pub payer: Snowflake,
    /// Amount paid back
    pub amount: Euro,
    /// Deposit above the base still held afterwards
    pub extra_remaining: Euro,
}

impl Refund {
    /// The `anzahlungReturn` ledger entry for this refund.
    #[must_use]
    pub fn transaction(&self, event_id: &str, time: DateTime<Utc>) -> Transaction {
        let guest = self.attendee.is_guest().then_some(self.attendee);
        Transaction::anzahlung_return(event_id, guest, self.extra_remaining, self.amount, time)
    }
}

/// Pays back surplus deposits until the held total no longer exceeds the cancellation fee.
///
/// Candidates are confirmed attendees who paid more than the base deposit. Each round picks
/// the first candidate by the key `(paid % base == 0, (paid - extra) % base != 0, -paid)`
/// and refunds either the whole surplus over the base or the remainder modulo the base.
/// Stops when the extra is used up or nobody holds more than the base.
pub fn rebalance(event: &mut Event) -> Vec<Refund> {
    let base = event.base_anzahlung();
    let ausfall = event.ausfall();
    let mut refunds = Vec::new();
    loop {
        let extra = event.anzahlung_total() - ausfall;
        if !extra.is_positive() {
            break;
        }
        let mut candidates: Vec<(Snowflake, Euro)> = event
            .signups()
            .into_iter()
            .map(|a| (a.id, event.paid(a)))
            .filter(|(_, paid)| *paid > base)
            .collect();
        candidates.sort_by_key(|(_, paid)| {
            (
                paid.modulo(base).is_zero(),
                !(*paid - extra).modulo(base).is_zero(),
                -*paid,
            )
        });
        let Some(&(id, paid)) = candidates.first() else {
            break;
        };
        let amount = if paid.modulo(base).is_zero() || (paid - extra).modulo(base).is_zero() {
            extra.min(paid - base)
        } else {
            extra.min(paid.modulo(base))
        };
        let Some(attendee) = event.attendee_mut(id) else {
            break;
        };
        let remaining = paid - amount;
        attendee.anzahlung = (remaining > base).then_some(remaining);
        debug!("Refunding {amount} of {paid} to {id}");
        refunds.push(Refund {
            attendee: id,
            payer: attendee.payer().unwrap_or(id),
            amount,
            extra_remaining: remaining - base,
        });
    }
    refunds
}

/// Rebalances an event and posts the refunds to the ledgers.
async fn rebalance_and_refund(portal: &Portal, event: &mut Event) -> Result<()> {
    let now = Utc::now();
    for refund in rebalance(event) {
        info!(
            "Returning {} of surplus deposit for {} on {}",
            refund.amount, refund.attendee, event.id
        );
        ledger::record(portal, refund.payer, refund.transaction(&event.id, now)).await?;
    }
    Ok(())
}

/// Signs a Mensch up for an event, paying `chosen_anzahlung` from their balance.
///
/// The chosen deposit must be at least the base deposit; paying more helps reach the
/// cancellation fee sooner and is refunded by rebalancing once it is no longer needed.
/// Profile edits from the same form are validated and applied before the deposit is debited.
#[instrument(skip(portal, edits))]
pub async fn signup_mensch(
    portal: &Portal,
    event_id: &str,
    mensch: Snowflake,
    chosen_anzahlung: Euro,
    edits: &AttendeeEdits,
) -> Result<Event> {
    let member = person::mensch(portal, mensch).await?;
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    if event.is_online() {
        return Err(Error::precondition("online events have no signup"));
    }
    if event.is_signed_up(mensch) {
        return Err(Error::precondition(format!(
            "{} is already signed up for {}",
            member.display_name(),
            event.data.name
        )));
    }
    if let Some(reason) = event.signup_block_reason(now_naive()) {
        return Err(Error::precondition(reason));
    }
    let base = event.base_anzahlung();
    if base.is_positive() && chosen_anzahlung < base {
        return Err(Error::validation(format!("the deposit is at least {base}")));
    }
    let now = Utc::now();
    // the attendee record is complete and validated before any money moves
    if event.attendee(mensch).is_none() {
        event.data.attendees.push(Attendee::mensch(mensch));
    }
    if let Some(attendee) = event.attendee_mut(mensch) {
        attendee.signup = Some(now);
        attendee.anzahlung = (base.is_positive() && chosen_anzahlung > base).then_some(chosen_anzahlung);
    }
    if !edits.is_empty() {
        apply_edits(&mut event, mensch, edits, now)?;
    }
    if base.is_positive() {
        let debit = Transaction::anzahlung(&event.id, None, chosen_anzahlung, now);
        if portal.is_admin(mensch) {
            ledger::record(portal, mensch, debit).await?;
        } else {
            ledger::record_checked(portal, mensch, debit).await?;
        }
    }
    rebalance_and_refund(portal, &mut event).await?;
    event.save(portal).await?;
    info!("{} signed up for {event_id}", member.display_name());
    announce_signup(portal, &event, mensch).await;
    Ok(event)
}

/// Outcome of adding a guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestSignup {
    /// The guest was confirmed right away
    Confirmed {
        /// Guest id within the event
        guest: Snowflake,
    },
    /// The deposit must be transferred to the treasurer first
    PaymentRequired {
        /// Guest id within the event
        guest: Snowflake,
        /// Reference the transfer must carry
        verwendungszweck: String,
        /// Deposit to transfer
        amount: Euro,
    },
}

/// Adds a guest brought along by `proxy`.
///
/// The guest gets a random free id below 100. Events without a deposit, and events whose
/// Abrechnung orga is the admin, confirm the guest immediately; otherwise the guest stays
/// pending until the treasurer confirms the payment with [`confirm_signup`].
#[instrument(skip(portal))]
pub async fn add_guest(portal: &Portal, event_id: &str, proxy: Snowflake, name: &str) -> Result<GuestSignup> {
    person::mensch(portal, proxy).await?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("the guest needs a name"));
    }
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    if let Some(reason) = event.guest_signup_block_reason(now_naive()) {
        return Err(Error::precondition(reason));
    }
    if event.guests().any(|g| g.name.as_deref() == Some(name)) {
        return Err(Error::precondition(format!("there is already a guest named {name}")));
    }
    let free: Vec<u64> = (0..GUEST_ID_LIMIT)
        .filter(|id| event.attendee(Snowflake::new(*id)).is_none())
        .collect();
    let guest = free
        .choose(&mut rand::rng())
        .copied()
        .map(Snowflake::new)
        .ok_or_else(|| Error::precondition("this event has no free guest ids left"))?;
    event
        .data
        .attendees
        .push(Attendee::guest(guest, name, proxy));
    info!("Added guest {name} ({guest}) to {event_id} via {proxy}");

    let auto_confirm = !event.base_anzahlung().is_positive()
        || event
            .orga(OrgaRole::Abrechnung)
            .is_some_and(|orga| portal.is_admin(orga.id));
    if auto_confirm {
        confirm_locked(portal, &mut event, guest).await?;
        event.save(portal).await?;
        announce_signup(portal, &event, guest).await;
        Ok(GuestSignup::Confirmed { guest })
    } else {
        event.save(portal).await?;
        Ok(GuestSignup::PaymentRequired {
            guest,
            verwendungszweck: event.verwendungszweck(guest),
            amount: event.base_anzahlung(),
        })
    }
}

/// Extracts the attendee id from a Verwendungszweck for this event.
pub fn parse_verwendungszweck(event_id: &str, text: &str) -> Result<Snowflake> {
    let pattern = Regex::new(&format!(r"^anzahlung {} (\d+)$", regex::escape(event_id)))
        .map_err(|e| Error::validation(e.to_string()))?;
    let captures = pattern
        .captures(text.trim())
        .ok_or_else(|| Error::validation(format!("expected \"anzahlung {event_id} <id>\"")))?;
    captures[1].parse()
}

/// Confirms a pending signup after the treasurer received the deposit.
///
/// `verwendungszweck` is the transfer reference; its id selects a pending guest (< 100) or a
/// Mensch (≥ 100). The payer's ledger is debited by the base deposit even if that
/// overdraws it, since the money arrived by bank transfer.
#[instrument(skip(portal))]
pub async fn confirm_signup(
    portal: &Portal,
    editor: Snowflake,
    event_id: &str,
    verwendungszweck: &str,
) -> Result<Event> {
    if !portal.is_admin(editor) && !portal.is_treasurer(editor) {
        return Err(Error::authz("only the treasurer can confirm payments"));
    }
    let id = parse_verwendungszweck(event_id, verwendungszweck)?;
    if !id.is_guest() {
        // must still be an active member of the guild
        person::mensch(portal, id).await?;
    }
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    if id.is_guest() && event.attendee(id).is_none() {
        return Err(Error::not_found("guest", id));
    }
    if event.is_signed_up(id) {
        return Err(Error::precondition(format!("{id} is already signed up")));
    }
    if event.attendee(id).is_none() {
        event.data.attendees.push(Attendee::mensch(id));
    }
    confirm_locked(portal, &mut event, id).await?;
    event.save(portal).await?;
    announce_signup(portal, &event, id).await;
    Ok(event)
}

/// Debits the payer, marks the attendee signed up and rebalances. The event lock must be held.
///
/// The debit is unchecked and may overdraw the payer: the deposit was paid outside the
/// portal, and the treasurer books the incoming transfer as a separate credit.
async fn confirm_locked(portal: &Portal, event: &mut Event, id: Snowflake) -> Result<()> {
    let base = event.base_anzahlung();
    let now = Utc::now();
    let attendee = event
        .attendee(id)
        .ok_or_else(|| Error::not_found("attendee", id))?;
    let payer = attendee
        .payer()
        .ok_or_else(|| Error::precondition(format!("guest {id} has no proxy")))?;
    if base.is_positive() {
        let guest = id.is_guest().then_some(id);
        ledger::record(portal, payer, Transaction::anzahlung(&event.id, guest, base, now)).await?;
    }
    if let Some(attendee) = event.attendee_mut(id) {
        attendee.signup = Some(now);
    }
    info!("Confirmed signup of {id} for {}", event.id);
    rebalance_and_refund(portal, event).await
}

/// Announces a confirmed signup. Failures are logged, the signup itself already stands.
async fn announce_signup(portal: &Portal, event: &Event, id: Snowflake) {
    if let Err(e) = try_announce_signup(portal, event, id).await {
        warn!("Failed to announce signup of {id} for {}: {e}", event.id);
    }
}

/// Posts in the event channel, grants the event role to Menschen and tells the proxy of
/// a guest.
async fn try_announce_signup(portal: &Portal, event: &Event, id: Snowflake) -> Result<()> {
    let attendee = event
        .attendee(id)
        .ok_or_else(|| Error::not_found("attendee", id))?;
    let text = match attendee.via.filter(|_| attendee.is_guest()) {
        Some(proxy) => {
            let proxy_name = person::by_snowflake(portal, proxy).await?.display_name();
            let guest_name = attendee.name.clone().unwrap_or_default();
            portal
                .bridge
                .notify_dm(
                    proxy,
                    &format!(
                        "Dein Gast {guest_name} ist jetzt für {} angemeldet.",
                        event.data.name
                    ),
                )
                .await;
            format!(
                "{guest_name} (Gast von {proxy_name}) hat sich für {} angemeldet",
                event.data.name
            )
        }
        None => {
            let name = person::by_snowflake(portal, id).await?.display_name();
            if let Some(role) = event.data.role {
                portal.bridge.grant_role(id, role).await;
            }
            format!("{name} hat sich für {} angemeldet", event.data.name)
        }
    };
    if let Some(channel) = event.data.channel {
        portal.bridge.notify_channel(channel, &text).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::bridge::Sent;
    use crate::core::ledger::{TransactionKind, balance, transactions};
    use crate::test_utils::*;

    fn eur(euros: i64) -> Euro {
        Euro::from_euros(euros)
    }

    fn paid_of(event: &Event, id: u64) -> Euro {
        event.paid(event.attendee(Snowflake::new(id)).unwrap())
    }

    #[test]
    fn test_rebalance_refunds_whole_surplus() {
        // four base deposits plus one doubled deposit against a 100 € fee
        let mut event = test_event("e", Some(eur(25)), Some(eur(100)));
        for id in [MENSCH_A, MENSCH_B, MENSCH_C, MENSCH_D] {
            confirm_attendee(&mut event, id, None);
        }
        confirm_attendee(&mut event, MENSCH_E, Some(eur(50)));
        assert_eq!(event.anzahlung_total(), eur(150));

        let refunds = rebalance(&mut event);
        assert_eq!(
            refunds,
            vec![Refund {
                attendee: Snowflake::new(MENSCH_E),
                payer: Snowflake::new(MENSCH_E),
                amount: eur(25),
                extra_remaining: Euro::ZERO,
            }]
        );
        assert_eq!(paid_of(&event, MENSCH_E), eur(25));
        assert_eq!(event.attendee(Snowflake::new(MENSCH_E)).unwrap().anzahlung, None);
        // everyone is at the base now, so the fee stays exceeded
        assert_eq!(event.anzahlung_total(), eur(125));
    }

    #[test]
    fn test_rebalance_partial_steps() {
        let mut event = test_event("e", Some(eur(25)), Some(eur(60)));
        confirm_attendee(&mut event, MENSCH_A, Some(eur(80)));
        confirm_attendee(&mut event, MENSCH_B, None);
        confirm_attendee(&mut event, MENSCH_C, None);
        assert_eq!(event.anzahlung_total(), eur(130));

        let refunds = rebalance(&mut event);
        let amounts: Vec<Euro> = refunds.iter().map(|r| r.amount).collect();
        // 80 % 25 = 5 first, then the remaining multiple down to the base
        assert_eq!(amounts, vec![eur(5), eur(50)]);
        assert_eq!(refunds[0].extra_remaining, eur(50));
        assert_eq!(refunds[1].extra_remaining, Euro::ZERO);
        assert_eq!(paid_of(&event, MENSCH_A), eur(25));
        assert_eq!(event.anzahlung_total(), eur(75));
    }

    #[test]
    fn test_rebalance_prefers_non_multiples() {
        let mut event = test_event("e", Some(eur(25)), Some(eur(100)));
        confirm_attendee(&mut event, MENSCH_A, Some(eur(50)));
        confirm_attendee(&mut event, MENSCH_B, Some(eur(30)));
        confirm_attendee(&mut event, MENSCH_C, Some(eur(45)));
        // total 125, extra 25: 30 and 45 are not multiples of 25 and sort first;
        // (45 - 25) % 25 != 0 and (30 - 25) % 25 != 0, so the larger one wins
        let refunds = rebalance(&mut event);
        assert_eq!(refunds[0].attendee, Snowflake::new(MENSCH_C));
        assert_eq!(refunds[0].amount, eur(20));
        // extra 5 is then absorbed exactly by the 30 € deposit
        assert_eq!(refunds[1].attendee, Snowflake::new(MENSCH_B));
        assert_eq!(refunds[1].amount, eur(5));
        assert_eq!(refunds.len(), 2);
        assert_eq!(event.anzahlung_total(), eur(100));
        assert_eq!(paid_of(&event, MENSCH_A), eur(50));
    }

    #[test]
    fn test_rebalance_stops_below_fee() {
        let mut event = test_event("e", Some(eur(25)), Some(eur(200)));
        confirm_attendee(&mut event, MENSCH_A, Some(eur(75)));
        confirm_attendee(&mut event, MENSCH_B, None);
        assert!(rebalance(&mut event).is_empty());
        assert_eq!(paid_of(&event, MENSCH_A), eur(75));
    }

    #[test]
    fn test_guest_refund_goes_to_proxy() {
        let mut event = test_event("e", Some(eur(10)), Some(Euro::ZERO));
        confirm_attendee(&mut event, MENSCH_A, None);
        confirm_attendee(&mut event, 4, Some(eur(20)));
        event.attendee_mut(Snowflake::new(4)).unwrap().via = Some(Snowflake::new(MENSCH_A));
        let refunds = rebalance(&mut event);
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].payer, Snowflake::new(MENSCH_A));
        let tx = refunds[0].transaction("e", Utc::now());
        assert_eq!(tx.guest, Some(Snowflake::new(4)));
        assert_eq!(tx.amount, eur(10));
    }

    #[test]
    fn test_parse_verwendungszweck() {
        assert_eq!(
            parse_verwendungszweck("2024w", " anzahlung 2024w 42 ").unwrap(),
            Snowflake::new(42)
        );
        assert!(parse_verwendungszweck("2024w", "anzahlung 2024s 42").is_err());
        assert!(parse_verwendungszweck("2024w", "anzahlung 2024w abc").is_err());
        assert!(parse_verwendungszweck("a.b", "anzahlung axb 1").is_err());
    }

    #[tokio::test]
    async fn test_basic_signup() -> Result<()> {
        let (portal, bridge) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        credit(&portal, MENSCH_A, eur(30)).await?;
        let mut event = test_event("e", Some(eur(25)), Some(Euro::ZERO));
        event.data.channel = Some(Snowflake::new(CHANNEL));
        event.data.role = Some(Snowflake::new(EVENT_ROLE));
        save_event(&portal, &event).await?;
        let alice = Snowflake::new(MENSCH_A);

        let event = signup_mensch(&portal, "e", alice, eur(25), &AttendeeEdits::default()).await?;

        assert_eq!(balance(&portal, alice).await?, eur(5));
        assert!(event.is_signed_up(alice));
        assert_eq!(event.anzahlung_total(), eur(25));
        assert_eq!(Event::load(&portal, "e").await?.anzahlung_total(), eur(25));
        let sent = bridge.sent();
        assert!(sent.contains(&Sent::Role(alice, Snowflake::new(EVENT_ROLE))));
        assert!(sent.iter().any(|s| matches!(s, Sent::Channel(c, _) if *c == Snowflake::new(CHANNEL))));
        Ok(())
    }

    #[tokio::test]
    async fn test_signup_with_extra_deposit_is_rebalanced() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_E, "eve").await?;
        credit(&portal, MENSCH_E, eur(50)).await?;
        let mut event = test_event("e", Some(eur(25)), Some(eur(100)));
        for id in [MENSCH_A, MENSCH_B, MENSCH_C, MENSCH_D] {
            confirm_attendee(&mut event, id, None);
        }
        save_event(&portal, &event).await?;
        let eve = Snowflake::new(MENSCH_E);

        let event = signup_mensch(&portal, "e", eve, eur(50), &AttendeeEdits::default()).await?;

        assert_eq!(paid_of(&event, MENSCH_E), eur(25));
        assert_eq!(event.anzahlung_total(), eur(125));
        assert_eq!(balance(&portal, eve).await?, eur(25));
        let kinds: Vec<TransactionKind> = transactions(&portal, eve).await?.into_iter().map(|tx| tx.kind).collect();
        assert_eq!(
            kinds,
            vec![TransactionKind::Transfer, TransactionKind::Anzahlung, TransactionKind::AnzahlungReturn]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_signup_requires_balance() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        credit(&portal, MENSCH_A, eur(10)).await?;
        save_event(&portal, &test_event("e", Some(eur(25)), None)).await?;
        let alice = Snowflake::new(MENSCH_A);

        let result = signup_mensch(&portal, "e", alice, eur(25), &AttendeeEdits::default()).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert!(!Event::load(&portal, "e").await?.is_signed_up(alice));

        let too_small = signup_mensch(&portal, "e", alice, eur(5), &AttendeeEdits::default()).await;
        assert!(matches!(too_small, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_edits_reject_signup_before_debit() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        credit(&portal, MENSCH_A, eur(30)).await?;
        save_event(&portal, &test_event("e", Some(eur(25)), None)).await?;
        let alice = Snowflake::new(MENSCH_A);
        let night = chrono::NaiveDate::from_ymd_opt(2099, 12, 30).unwrap();
        let edits = AttendeeEdits {
            nights: [(night, crate::core::event::Going::Yes)].into(),
            ..AttendeeEdits::default()
        };

        let result = signup_mensch(&portal, "e", alice, eur(25), &edits).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert!(!Event::load(&portal, "e").await?.is_signed_up(alice));
        assert_eq!(balance(&portal, alice).await?, eur(30));
        assert_eq!(transactions(&portal, alice).await?.len(), 1);

        let event = signup_mensch(&portal, "e", alice, eur(25), &AttendeeEdits::default()).await?;
        assert!(event.is_signed_up(alice));
        assert_eq!(balance(&portal, alice).await?, eur(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_signup_rejected() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        credit(&portal, MENSCH_A, eur(100)).await?;
        save_event(&portal, &test_event("e", Some(eur(25)), None)).await?;
        let alice = Snowflake::new(MENSCH_A);
        signup_mensch(&portal, "e", alice, eur(25), &AttendeeEdits::default()).await?;
        let before = Event::load(&portal, "e").await?;
        let balance_before = balance(&portal, alice).await?;

        let again = signup_mensch(&portal, "e", alice, eur(25), &AttendeeEdits::default()).await;

        assert!(matches!(again, Err(Error::Precondition { .. })));
        assert_eq!(Event::load(&portal, "e").await?, before);
        assert_eq!(balance(&portal, alice).await?, balance_before);
        Ok(())
    }

    #[tokio::test]
    async fn test_online_and_blocked_events_reject_signup() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        save_location(&portal, "discord", &test_location(true)).await?;
        let mut online = test_event("online", None, None);
        online.data.location = Some("discord".to_string());
        save_event(&portal, &online).await?;
        let mut blocked = test_event("voll", None, None);
        blocked.data.signup_block = Some("Das Event ist voll.".to_string());
        save_event(&portal, &blocked).await?;
        let alice = Snowflake::new(MENSCH_A);

        let result = signup_mensch(&portal, "online", alice, Euro::ZERO, &AttendeeEdits::default()).await;
        assert!(matches!(result, Err(Error::Precondition { .. })));
        let result = signup_mensch(&portal, "voll", alice, Euro::ZERO, &AttendeeEdits::default()).await;
        assert!(matches!(result, Err(Error::Precondition { message }) if message == "Das Event ist voll."));
        Ok(())
    }

    #[tokio::test]
    async fn test_guest_auto_confirm_without_deposit() -> Result<()> {
        let (portal, bridge) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        save_event(&portal, &test_event("e", None, None)).await?;

        let outcome = add_guest(&portal, "e", Snowflake::new(MENSCH_A), " Alice ").await?;

        let GuestSignup::Confirmed { guest } = outcome else {
            panic!("expected the guest to be confirmed, got {outcome:?}");
        };
        assert!(guest.is_guest());
        let event = Event::load(&portal, "e").await?;
        let record = event.attendee(guest).unwrap();
        assert!(record.is_signed_up());
        assert_eq!(record.name.as_deref(), Some("Alice"));
        assert_eq!(record.via, Some(Snowflake::new(MENSCH_A)));
        assert!(transactions(&portal, Snowflake::new(MENSCH_A)).await?.is_empty());
        assert!(bridge.sent().iter().any(|s| matches!(s, Sent::Dm(to, _) if *to == Snowflake::new(MENSCH_A))));

        let duplicate = add_guest(&portal, "e", Snowflake::new(MENSCH_A), "Alice").await;
        assert!(matches!(duplicate, Err(Error::Precondition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_guest_payment_and_confirmation() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        add_mensch(&portal, TREASURER, "kassenwart").await?;
        save_event(&portal, &test_event("e", Some(eur(25)), Some(eur(500)))).await?;
        let alice = Snowflake::new(MENSCH_A);

        let outcome = add_guest(&portal, "e", alice, "Bob").await?;
        let GuestSignup::PaymentRequired { guest, verwendungszweck, amount } = outcome else {
            panic!("expected a pending guest, got {outcome:?}");
        };
        assert_eq!(verwendungszweck, format!("anzahlung e {guest}"));
        assert_eq!(amount, eur(25));
        let pending = Event::load(&portal, "e").await?;
        assert!(!pending.is_signed_up(guest));
        assert_eq!(pending.anzahlung_total(), Euro::ZERO);

        let denied = confirm_signup(&portal, alice, "e", &verwendungszweck).await;
        assert!(matches!(denied, Err(Error::Authz { .. })));

        let event = confirm_signup(&portal, Snowflake::new(TREASURER), "e", &verwendungszweck).await?;
        assert!(event.is_signed_up(guest));
        let tx = transactions(&portal, alice).await?.pop().unwrap();
        assert_eq!(tx.kind, TransactionKind::Anzahlung);
        assert_eq!(tx.amount, eur(-25));
        assert_eq!(tx.guest, Some(guest));

        let again = confirm_signup(&portal, Snowflake::new(TREASURER), "e", &verwendungszweck).await;
        assert!(matches!(again, Err(Error::Precondition { .. })));
        let other = if guest.get() == 0 { 1 } else { 0 };
        let unknown = confirm_signup(&portal, Snowflake::new(TREASURER), "e", &format!("anzahlung e {other}")).await;
        assert!(matches!(unknown, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_announcement_keeps_confirmed_signup() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        let mut event = test_event("e", Some(eur(25)), Some(eur(500)));
        event.data.channel = Some(Snowflake::new(CHANNEL));
        save_event(&portal, &event).await?;
        let alice = Snowflake::new(MENSCH_A);
        let outcome = add_guest(&portal, "e", alice, "Bob").await?;
        let GuestSignup::PaymentRequired { guest, verwendungszweck, .. } = outcome else {
            panic!("expected a pending guest, got {outcome:?}");
        };
        // the proxy's profile can no longer be read, so the announcement fails
        portal
            .store
            .save(Table::Profiles, &alice.to_string(), &serde_json::json!({ "username": 5 }))
            .await?;

        let event = confirm_signup(&portal, Snowflake::new(TREASURER), "e", &verwendungszweck).await?;
        assert!(event.is_signed_up(guest));
        assert!(Event::load(&portal, "e").await?.is_signed_up(guest));
        assert_eq!(balance(&portal, alice).await?, eur(-25));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_abrechnung_auto_confirms_guests() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_A, "alice").await?;
        let mut event = test_event("e", Some(eur(25)), Some(eur(500)));
        confirm_attendee(&mut event, ADMIN, None);
        event.attendee_mut(Snowflake::new(ADMIN)).unwrap().orga = vec![OrgaRole::Abrechnung];
        save_event(&portal, &event).await?;

        let outcome = add_guest(&portal, "e", Snowflake::new(MENSCH_A), "Carol").await?;
        assert!(matches!(outcome, GuestSignup::Confirmed { .. }));
        assert_eq!(balance(&portal, Snowflake::new(MENSCH_A)).await?, eur(-25));
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_member_signup() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        add_mensch(&portal, MENSCH_B, "bob").await?;
        add_discord_guest(&portal, 555, "gast").await?;
        save_event(&portal, &test_event("e", Some(eur(25)), Some(eur(500)))).await?;

        let event = confirm_signup(&portal, Snowflake::new(ADMIN), "e", &format!("anzahlung e {MENSCH_B}")).await?;
        assert!(event.is_signed_up(Snowflake::new(MENSCH_B)));
        assert_eq!(balance(&portal, Snowflake::new(MENSCH_B)).await?, eur(-25));

        let not_member = confirm_signup(&portal, Snowflake::new(ADMIN), "e", "anzahlung e 555").await;
        assert!(matches!(not_member, Err(Error::Authz { .. })));
        Ok(())
    }
}
