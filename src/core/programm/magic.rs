//! The custom Magic draft: attendees vote on which custom set to draft.

use super::{FormField, ProgrammDoc, Programmpunkt};
use crate::{
    config::{MagicSetConfig, PortalConfig},
    core::{
        event::{Event, OrgaRole, now_naive},
        person::Snowflake,
        portal::Portal,
    },
    errors::{Error, Result},
    store::Table,
};
use tracing::{info, instrument};

/// Url part of the custom Magic draft.
pub const URL_PART: &str = "custom-magic-draft";

/// The set drafted at this event, if one has been chosen.
#[must_use]
pub fn drafted_set<'a>(event: &Event, config: &'a PortalConfig) -> Option<&'a MagicSetConfig> {
    config
        .magic_sets
        .iter()
        .find(|set| set.drafted.as_deref() == Some(event.id.as_str()))
}

/// Sets that can still be voted on.
pub fn draftable_sets(config: &PortalConfig) -> impl Iterator<Item = &MagicSetConfig> {
    config.magic_sets.iter().filter(|set| set.drafted.is_none())
}

/// Stored signups plus the fixed orga, who always takes part.
#[must_use]
pub fn signups(doc: &ProgrammDoc, config: &PortalConfig) -> Vec<Snowflake> {
    let mut signups = vec![config.magic_orga];
    signups.extend(doc.signups.iter().filter(|id| **id != config.magic_orga));
    signups
}

/// The drafted set's blurb once a set is chosen, the stored description before.
#[must_use]
pub fn description(doc: &ProgrammDoc, event: &Event, config: &PortalConfig) -> Option<String> {
    match drafted_set(event, config) {
        Some(set) => Some(
            set.blurb
                .clone()
                .unwrap_or_else(|| format!("Wir draften {}.", set.name)),
        ),
        None => doc.description.clone(),
    }
}

/// One checkbox per draftable set, until a set has been chosen.
#[must_use]
pub fn vote_fields(doc: &ProgrammDoc, event: &Event, config: &PortalConfig, editor: Snowflake) -> Vec<FormField> {
    if drafted_set(event, config).is_some() {
        return Vec::new();
    }
    draftable_sets(config)
        .map(|set| FormField::MagicSetVote {
            code: set.code.clone(),
            name: set.name.clone(),
            checked: doc
                .votes
                .get(&set.code)
                .is_some_and(|voters| voters.contains(&editor)),
        })
        .collect()
}

/// Adds the draft to an event, organised by the configured Magic orga.
///
/// Allowed for that orga, the Programm orga and the admin.
#[instrument(skip(portal))]
pub async fn create_draft(portal: &Portal, event_id: &str, editor: Snowflake) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    let allowed = portal.is_admin(editor)
        || editor == portal.config.magic_orga
        || event.is_orga_for(editor, OrgaRole::Programm);
    if !allowed {
        return Err(Error::authz("you cannot add a custom Magic draft"));
    }
    if event.ended(now_naive()) {
        return Err(Error::precondition("this event is already over"));
    }
    if event.data.programm.contains_key(URL_PART) {
        return Err(Error::precondition("this event already has a custom Magic draft"));
    }
    let doc = ProgrammDoc {
        orga: Some(portal.config.magic_orga),
        ..ProgrammDoc::default()
    };
    event.data.programm.insert(URL_PART.to_string(), doc);
    event.save(portal).await?;
    info!("Added custom Magic draft to {event_id}");
    Ok(event)
}

/// Toggles `editor`'s vote for a set.
///
/// Voting is open to everyone who could sign up, and to those already signed up, until a
/// set has been drafted.
#[instrument(skip(portal))]
pub async fn vote(portal: &Portal, event_id: &str, editor: Snowflake, set_code: &str) -> Result<Event> {
    let _guard = portal.locks.lock(Table::Events, event_id).await;
    let mut event = Event::load(portal, event_id).await?;
    let item = Programmpunkt::get(&event, URL_PART)?;
    if drafted_set(&event, &portal.config).is_some() {
        return Err(Error::precondition("the set has already been chosen"));
    }
    if !draftable_sets(&portal.config).any(|set| set.code == set_code) {
        return Err(Error::validation(format!("unknown set {set_code}")));
    }
    let now = now_naive();
    let signed_up = item.signups(&portal.config).contains(&editor);
    if !signed_up && !item.can_signup(portal, &event, editor, editor, now).await? {
        return Err(Error::authz("only attendees can vote"));
    }
    let mut doc = item.doc;
    let voters = doc.votes.entry(set_code.to_string()).or_default();
    if voters.contains(&editor) {
        voters.retain(|id| *id != editor);
    } else {
        voters.push(editor);
    }
    event.data.programm.insert(URL_PART.to_string(), doc);
    event.save(portal).await?;
    Ok(event)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::programm::{ProgrammEdits, ProgrammKind, edit_programmpunkt, leave_programmpunkt};
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_orga_is_fixed_and_always_signed_up() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        save_event(&portal, &event).await?;
        let orga = Snowflake::new(MAGIC_ORGA);

        let denied = create_draft(&portal, "e", Snowflake::new(MENSCH_A)).await;
        assert!(matches!(denied, Err(Error::Authz { .. })));
        let event = create_draft(&portal, "e", orga).await?;
        let item = Programmpunkt::get(&event, URL_PART)?;
        assert_eq!(item.kind, ProgrammKind::CustomMagicDraft);
        assert_eq!(item.name(), "Custom Magic Draft");
        assert_eq!(item.orga(&portal.config), Some(orga));
        assert_eq!(item.signups(&portal.config), vec![orga]);

        let transfer = ProgrammEdits {
            orga: Some(Snowflake::new(MENSCH_A)),
            ..ProgrammEdits::default()
        };
        let result = edit_programmpunkt(&portal, "e", orga, URL_PART, &transfer).await;
        assert!(matches!(result, Err(Error::Precondition { .. })));
        let leave = leave_programmpunkt(&portal, "e", orga, URL_PART, orga).await;
        assert!(matches!(leave, Err(Error::Precondition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_votes_toggle() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        let mut event = test_event("e", None, None);
        confirm_attendee(&mut event, MENSCH_A, None);
        save_event(&portal, &event).await?;
        create_draft(&portal, "e", Snowflake::new(ADMIN)).await?;
        let a = Snowflake::new(MENSCH_A);

        let event = vote(&portal, "e", a, "cube").await?;
        let doc = &event.data.programm[URL_PART];
        assert_eq!(doc.votes["cube"], vec![a]);
        let item = Programmpunkt::get(&event, URL_PART)?;
        let fields = item.form_fields(&event, &portal.config, a, &Default::default());
        assert!(fields.contains(&FormField::MagicSetVote {
            code: "cube".to_string(),
            name: "Gefolge Cube".to_string(),
            checked: true,
        }));

        let event = vote(&portal, "e", a, "cube").await?;
        assert!(event.data.programm[URL_PART].votes["cube"].is_empty());

        let unknown = vote(&portal, "e", a, "nope").await;
        assert!(matches!(unknown, Err(Error::Validation { .. })));
        let outsider = vote(&portal, "e", Snowflake::new(MENSCH_B), "cube").await;
        assert!(matches!(outsider, Err(Error::Authz { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_drafted_set_switches_description() -> Result<()> {
        let (portal, _) = setup_test_portal().await?;
        let mut event = test_event("drafted", None, None);
        event.data.programm.insert(
            URL_PART.to_string(),
            ProgrammDoc {
                description: Some("Abstimmung läuft".to_string()),
                ..ProgrammDoc::default()
            },
        );
        let item = Programmpunkt::get(&event, URL_PART)?;
        // the fixture config marks the "old" set as drafted at event "drafted"
        assert_eq!(
            item.description(&event, &portal.config).as_deref(),
            Some("Ein Set aus alten Zeiten.")
        );
        assert!(vote_fields(&item.doc, &event, &portal.config, Snowflake::new(MENSCH_A)).is_empty());

        event.id = "other".to_string();
        assert_eq!(item.description(&event, &portal.config).as_deref(), Some("Abstimmung läuft"));
        Ok(())
    }
}
