//! Event Discord commands - signups, guests, payment confirmation and calendars.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, author, handlers::autocomplete},
        core::{
            calendar::{self, Calendar},
            event::{AttendeeEdits, Event},
            money::Euro,
            signup::{self, GuestSignup},
        },
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;

    /// Signs you up for an event, paying the deposit from your balance.
    ///
    /// Without an amount the base deposit is paid; more can be chosen to help reach the
    /// cancellation fee sooner.
    #[poise::command(slash_command, prefix_command)]
    pub async fn signup(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Event id"]
        #[autocomplete = "autocomplete::autocomplete_event_id"]
        event: String,
        #[description = "Deposit to pay, e.g. 50"] anzahlung: Option<String>,
    ) -> Result<()> {
        let portal = &ctx.data().portal;
        let chosen = match anzahlung {
            Some(amount) => amount.parse::<Euro>()?,
            None => Event::load(portal, &event).await?.base_anzahlung(),
        };
        let event = signup::signup_mensch(portal, &event, author(ctx), chosen, &AttendeeEdits::default()).await?;
        ctx.say(format!("✅ Du bist für {} angemeldet.", event.data.name)).await?;
        Ok(())
    }

    /// Signs up a guest you bring along.
    #[poise::command(slash_command, prefix_command)]
    pub async fn guest(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Event id"]
        #[autocomplete = "autocomplete::autocomplete_event_id"]
        event: String,
        #[description = "Name of the guest"] name: String,
    ) -> Result<()> {
        let portal = &ctx.data().portal;
        let message = match signup::add_guest(portal, &event, author(ctx), &name).await? {
            GuestSignup::Confirmed { .. } => format!("✅ {name} ist angemeldet."),
            GuestSignup::PaymentRequired {
                verwendungszweck,
                amount,
                ..
            } => format!(
                "⏳ {name} ist vorgemerkt. Bitte überweise {amount} an den Kassenwart, \
                Verwendungszweck: `{verwendungszweck}`"
            ),
        };
        ctx.say(message).await?;
        Ok(())
    }

    /// Confirms a deposit payment by its transfer reference. Treasurer only.
    #[poise::command(slash_command, prefix_command)]
    pub async fn confirm(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Event id"]
        #[autocomplete = "autocomplete::autocomplete_event_id"]
        event: String,
        #[description = "Verwendungszweck of the transfer"] verwendungszweck: String,
    ) -> Result<()> {
        let portal = &ctx.data().portal;
        let event = signup::confirm_signup(portal, author(ctx), &event, &verwendungszweck).await?;
        ctx.say(format!("✅ Anmeldung für {} bestätigt.", event.data.name)).await?;
        Ok(())
    }

    /// Sends an event's calendar, or without an event the calendar of your signups.
    #[poise::command(slash_command, prefix_command, ephemeral)]
    pub async fn calendar(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Event id"]
        #[autocomplete = "autocomplete::autocomplete_event_id"]
        event: Option<String>,
    ) -> Result<()> {
        let portal = &ctx.data().portal;
        let (cal, filename): (Calendar, String) = match event {
            Some(id) => {
                let event = Event::load(portal, &id).await?;
                (calendar::event_calendar(&event, &portal.config), format!("{id}.ics"))
            }
            None => (
                calendar::signups_calendar(portal, author(ctx)).await?,
                "gefolge.ics".to_string(),
            ),
        };
        let attachment = serenity::CreateAttachment::bytes(cal.to_ical().into_bytes(), filename);
        ctx.send(poise::CreateReply::default().attachment(attachment)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
