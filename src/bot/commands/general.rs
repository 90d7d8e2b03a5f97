//! General Discord commands - ping and help.
//! These don't touch the portal's documents.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "**gefolge.org Hilfe**\n\n\
        **Guthaben**\n\
        • `/balance` - Zeigt dein Guthaben.\n\
        • `/transfer <mensch> <betrag> [kommentar]` - Überträgt Guthaben an einen Mensch.\n\
        • `/treasurer` - Zeigt den Kassenstand (nur Kassenwart).\n\n\
        **Events**\n\
        • `/signup <event> [anzahlung]` - Meldet dich für ein Event an.\n\
        • `/guest <event> <name>` - Meldet einen Gast an.\n\
        • `/confirm <event> <verwendungszweck>` - Bestätigt eine Anzahlung (nur Kassenwart).\n\
        • `/calendar [event]` - Kalender eines Events oder deiner Anmeldungen als .ics.\n\n\
        **Sonstiges**\n\
        • `/ping` - Prüft, ob der Bot antwortet.\n\
        • `/help` - Zeigt diese Hilfe.";

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
