//! Autocomplete handlers for Discord slash command parameters.

use crate::{
    bot::BotData,
    core::event::{Event, now_naive},
    errors::Error,
};

/// Suggests ids of events that have not ended yet, matching the partial input by id or name.
pub async fn autocomplete_event_id(ctx: poise::Context<'_, BotData, Error>, partial: &str) -> Vec<String> {
    let Ok(events) = Event::load_all(&ctx.data().portal).await else {
        return Vec::new();
    };
    let now = now_naive();
    let partial_lower = partial.to_lowercase();
    let mut matching: Vec<(chrono::NaiveDateTime, String)> = events
        .into_iter()
        .filter(|event| !event.ended(now))
        .filter(|event| {
            event.id.to_lowercase().contains(&partial_lower)
                || event.data.name.to_lowercase().contains(&partial_lower)
        })
        .map(|event| (event.data.start, event.id))
        .collect();
    // soonest first
    matching.sort();
    matching.into_iter().map(|(_, id)| id).take(25).collect()
}
