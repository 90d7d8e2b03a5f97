//! Ledger Discord commands - `balance`, `transfer` and `treasurer`.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, author},
        core::{ledger, money::Euro, person::Snowflake},
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;

    /// Shows your credit balance and your latest transactions.
    #[poise::command(slash_command, prefix_command, ephemeral)]
    pub async fn balance(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let portal = &ctx.data().portal;
        let userdata = ledger::userdata(portal, author(ctx)).await?;
        let mut message = format!("Dein Guthaben: **{}**", userdata.balance());
        for tx in userdata.transactions.iter().rev().take(5) {
            message.push_str(&format!(
                "\n• {} {} ({})",
                tx.time.format("%d.%m.%Y"),
                tx.amount,
                tx.kind
            ));
        }
        ctx.say(message).await?;
        Ok(())
    }

    /// Transfers credit to another Mensch.
    #[poise::command(slash_command, prefix_command)]
    pub async fn transfer(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Recipient"] recipient: serenity::User,
        #[description = "Amount, e.g. 12,50"] amount: String,
        #[description = "Optional comment"] comment: Option<String>,
    ) -> Result<()> {
        let amount: Euro = amount.parse()?;
        let portal = &ctx.data().portal;
        let recipient = Snowflake::new(recipient.id.get());
        ledger::transfer(portal, author(ctx), recipient, amount, comment.as_deref()).await?;
        ctx.say(format!("✅ {amount} an <@{recipient}> übertragen.")).await?;
        Ok(())
    }

    /// Shows the treasurer's virtual balance. Treasurer and admin only.
    #[poise::command(slash_command, prefix_command, ephemeral)]
    pub async fn treasurer(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let portal = &ctx.data().portal;
        let caller = author(ctx);
        if !portal.is_treasurer(caller) && !portal.is_admin(caller) {
            return Err(Error::authz("only the treasurer can see the treasury"));
        }
        let total = ledger::treasurer_balance(portal).await?;
        ctx.say(format!("Kassenstand: **{total}**")).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
