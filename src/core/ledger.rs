//! Credit ledger - per-Mensch transaction logs and balances.
//!
//! Every Mensch has an append-only list of transactions in their user data document; the
//! balance is derived by summing it. Transfers post a pair of mirrored entries with the same
//! timestamp and comment. The treasurer's balance is virtual: it is what the treasurer owes
//! to everyone else, i.e. unsettled event deposits plus members' positive balances.

use crate::{
    core::{event::Event, money::Euro, person, person::Snowflake, portal::Portal},
    errors::{Error, Result},
    store::Table,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt};
use tracing::{info, instrument, warn};

/// Per-user document holding the transaction log and settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    /// Transaction log, oldest first
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// API key for HTTP Basic auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Preferred IANA timezone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Challonge username for tournament signups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challonge: Option<String>,
    /// start.gg user slug for tournament signups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startgg: Option<String>,
    /// Display preferences, Twitch link and other settings
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserData {
    /// Sum of all transaction amounts.
    #[must_use]
    pub fn balance(&self) -> Euro {
        self.transactions.iter().map(|tx| tx.amount).sum()
    }

    /// Whether an `eventAbrechnung` for the given event has been posted.
    #[must_use]
    pub fn has_abrechnung(&self, event_id: &str) -> bool {
        self.transactions.iter().any(|tx| {
            tx.kind == TransactionKind::EventAbrechnung && tx.event.as_deref() == Some(event_id)
        })
    }
}

/// The `type` of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionKind {
    /// Money moved between two Menschen
    Transfer,
    /// Deposit paid on event signup
    Anzahlung,
    /// Surplus deposit paid back by rebalancing
    AnzahlungReturn,
    /// Final settlement of an event
    EventAbrechnung,
    /// Minecraft server contribution
    Wurstmineberg,
    /// Kinds written by other tools
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => write!(f, "Übertragung"),
            Self::Anzahlung => write!(f, "Anzahlung"),
            Self::AnzahlungReturn => write!(f, "Anzahlung zurück"),
            Self::EventAbrechnung => write!(f, "Abrechnung"),
            Self::Wurstmineberg => write!(f, "Wurstmineberg"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// What kind of entry this is
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Signed amount; negative means money left this ledger
    pub amount: Euro,
    /// When the entry was posted
    pub time: DateTime<Utc>,
    /// Related event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Related guest id within `event`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<Snowflake>,
    /// Counterparty of a transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_party: Option<Snowflake>,
    /// Free-text comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Deposit above the base amount still held after a refund
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_remaining: Option<Euro>,
    /// Variant fields written by other tools
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    fn new(kind: TransactionKind, amount: Euro, time: DateTime<Utc>) -> Self {
        Self {
            kind,
            amount,
            time,
            event: None,
            guest: None,
            other_party: None,
            comment: None,
            extra_remaining: None,
            extra: Map::new(),
        }
    }

    /// One half of a transfer; `amount` is already signed for this ledger.
    #[must_use]
    pub fn transfer(
        other_party: Snowflake,
        amount: Euro,
        comment: Option<&str>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            other_party: Some(other_party),
            comment: comment.map(str::to_string),
            ..Self::new(TransactionKind::Transfer, amount, time)
        }
    }

    /// Deposit debit of `paid` for an event, optionally on behalf of a guest.
    #[must_use]
    pub fn anzahlung(event: &str, guest: Option<Snowflake>, paid: Euro, time: DateTime<Utc>) -> Self {
        Self {
            event: Some(event.to_string()),
            guest,
            ..Self::new(TransactionKind::Anzahlung, -paid, time)
        }
    }

    /// Refund of `refunded` surplus deposit, leaving `extra_remaining` above the base.
    #[must_use]
    pub fn anzahlung_return(
        event: &str,
        guest: Option<Snowflake>,
        extra_remaining: Euro,
        refunded: Euro,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            event: Some(event.to_string()),
            guest,
            extra_remaining: Some(extra_remaining),
            ..Self::new(TransactionKind::AnzahlungReturn, refunded, time)
        }
    }

    /// Settlement of an event; `amount` is signed for this ledger.
    #[must_use]
    pub fn event_abrechnung(
        event: &str,
        amount: Euro,
        comment: Option<&str>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            event: Some(event.to_string()),
            comment: comment.map(str::to_string),
            ..Self::new(TransactionKind::EventAbrechnung, amount, time)
        }
    }
}

/// The full user data document of a user (empty if none exists).
pub async fn userdata(portal: &Portal, id: Snowflake) -> Result<UserData> {
    portal
        .store
        .load_or_default(Table::UserData, &id.to_string())
        .await
}

/// Transaction history of a user, oldest first.
pub async fn transactions(portal: &Portal, id: Snowflake) -> Result<Vec<Transaction>> {
    Ok(userdata(portal, id).await?.transactions)
}

/// Current balance of a user.
pub async fn balance(portal: &Portal, id: Snowflake) -> Result<Euro> {
    Ok(userdata(portal, id).await?.balance())
}

/// Appends a transaction to a user's log.
pub async fn record(portal: &Portal, owner: Snowflake, tx: Transaction) -> Result<()> {
    append(portal, owner, tx, true).await
}

/// Appends a debit, failing if it would take the balance below zero.
///
/// The balance check and the append happen under the same ledger lock.
pub async fn record_checked(portal: &Portal, owner: Snowflake, tx: Transaction) -> Result<()> {
    append(portal, owner, tx, false).await
}

async fn append(portal: &Portal, owner: Snowflake, tx: Transaction, allow_negative: bool) -> Result<()> {
    let _guard = portal.locks.lock(Table::UserData, &owner.to_string()).await;
    append_locked(portal, owner, tx, allow_negative).await
}

/// Appends with the owner's ledger lock already held.
async fn append_locked(portal: &Portal, owner: Snowflake, tx: Transaction, allow_negative: bool) -> Result<()> {
    let id = owner.to_string();
    let mut data: UserData = portal.store.load_or_default(Table::UserData, &id).await?;
    let balance = data.balance();
    if !allow_negative && balance + tx.amount < Euro::ZERO {
        return Err(Error::InsufficientFunds {
            balance,
            required: -tx.amount,
        });
    }
    info!(
        "Posting {:?} of {} to {owner} (event {:?})",
        tx.kind, tx.amount, tx.event
    );
    data.transactions.push(tx);
    portal.store.save(Table::UserData, &id, &data).await
}

/// Removes the latest entry equal to `tx` from a ledger whose lock is held.
async fn remove_locked(portal: &Portal, owner: Snowflake, tx: &Transaction) -> Result<()> {
    let id = owner.to_string();
    let mut data: UserData = portal.store.load_or_default(Table::UserData, &id).await?;
    if let Some(index) = data.transactions.iter().rposition(|entry| entry == tx) {
        data.transactions.remove(index);
        portal.store.save(Table::UserData, &id, &data).await?;
    }
    Ok(())
}

/// Moves credit from `sender` to `recipient`.
///
/// Fails if `sender` cannot cover the amount, unless they are the admin or the treasurer
/// (whose ledgers may go negative). The recipient is notified by DM on a best-effort basis.
#[instrument(skip(portal))]
pub async fn transfer(
    portal: &Portal,
    sender: Snowflake,
    recipient: Snowflake,
    amount: Euro,
    comment: Option<&str>,
) -> Result<()> {
    if !amount.is_positive() {
        return Err(Error::validation("transfer amount must be positive"));
    }
    if sender == recipient {
        return Err(Error::validation("cannot transfer to yourself"));
    }
    let sender_member = person::mensch(portal, sender).await?;
    let recipient_member = person::by_snowflake(portal, recipient)
        .await?
        .into_mensch()
        .map_err(|_| Error::validation("the recipient is not a member of the Gefolge"))?;
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());

    let now = Utc::now();
    let debit = Transaction::transfer(recipient, -amount, comment, now);
    let credit = Transaction::transfer(sender, amount, comment, now);
    let allow_negative = portal.is_admin(sender) || portal.is_treasurer(sender);
    {
        // both ledgers stay locked until the pair is written, lower snowflake first
        let (first, second) = if sender < recipient { (sender, recipient) } else { (recipient, sender) };
        let _first = portal.locks.lock(Table::UserData, &first.to_string()).await;
        let _second = portal.locks.lock(Table::UserData, &second.to_string()).await;
        append_locked(portal, sender, debit.clone(), allow_negative).await?;
        if let Err(e) = append_locked(portal, recipient, credit, true).await {
            warn!("Crediting {recipient} failed, reverting debit of {sender}: {e}");
            remove_locked(portal, sender, &debit).await?;
            return Err(e);
        }
    }

    let mut message = format!(
        "{} hat dir {amount} übertragen.",
        sender_member.display_name()
    );
    if let Some(comment) = comment {
        message.push_str(&format!(" Kommentar: {comment}"));
    }
    portal.bridge.notify_dm(recipient_member.id, &message).await;
    Ok(())
}

/// Posts the settlement of an event for one Mensch. Admin and treasurer only.
#[instrument(skip(portal))]
pub async fn event_abrechnung(
    portal: &Portal,
    editor: Snowflake,
    event_id: &str,
    mensch: Snowflake,
    amount: Euro,
    comment: Option<&str>,
) -> Result<()> {
    if !portal.is_admin(editor) && !portal.is_treasurer(editor) {
        return Err(Error::authz("only the treasurer can settle events"));
    }
    // make sure the event exists
    Event::load(portal, event_id).await?;
    record(
        portal,
        mensch,
        Transaction::event_abrechnung(event_id, amount, comment, Utc::now()),
    )
    .await
}

/// The treasurer's virtual balance.
///
/// Sum of `-anzahlung_total` over events with a deposit that nobody has an
/// `eventAbrechnung` for, plus `-balance` over Menschen other than the treasurer whose
/// balance is positive.
pub async fn treasurer_balance(portal: &Portal) -> Result<Euro> {
    let mut ledgers: HashMap<Snowflake, UserData> = HashMap::new();
    let mut total = Euro::ZERO;

    for event in Event::load_all(portal).await? {
        if event.data.anzahlung.is_none() {
            continue;
        }
        let mut settled = false;
        for attendee in event.menschen() {
            if !ledgers.contains_key(&attendee.id) {
                ledgers.insert(attendee.id, userdata(portal, attendee.id).await?);
            }
            if ledgers
                .get(&attendee.id)
                .is_some_and(|data| data.has_abrechnung(&event.id))
            {
                settled = true;
                break;
            }
        }
        if !settled {
            total -= event.anzahlung_total();
        }
    }

    for member in person::menschen(portal).await? {
        if portal.is_treasurer(member.id) {
            continue;
        }
        let balance = match ledgers.get(&member.id) {
            Some(data) => data.balance(),
            None => balance(portal, member.id).await?,
        };
        if balance.is_positive() {
            total -= balance;
        }
    }
    Ok(total)
}
