//! Notifications and how each channel presents them.

use chrono::{SecondsFormat, Utc};

use crate::domain::{EntityId, Position, TerminalKind};
use crate::labels::{self, StyledMessage};
use crate::webhook::{Embed, EmbedField, Footer, Thumbnail};
use crate::world::Dimension;

const RARE_VARIANT_COLOR: u32 = 0xE91E63;
const APPEARED_COLOR: u32 = 0xF1C40F;
const CAPTURED_COLOR: u32 = 0x2ECC71;
const DEFEATED_COLOR: u32 = 0x95A5A6;

const APPEARED_DESCRIPTION: &str = "A new Pokémon has appeared!";

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    Appeared {
        dimension: Dimension,
        position: Position,
    },
    Resolved {
        kind: TerminalKind,
        actor: Option<String>,
    },
}

/// Everything both channels need to announce one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub entity_id: EntityId,
    /// Canonical species id, the enrichment key
    pub species_id: String,
    /// Species name with optional form suffix
    pub display_name: String,
    pub labels: Vec<String>,
    pub rare_variant: bool,
    pub observer: Option<String>,
    pub kind: NotificationKind,
}

impl Notification {
    /// In-session text: styled labels followed by a plain sentence.
    pub fn local_message(&self) -> StyledMessage {
        labels::render(&self.labels, &self.tail_text())
    }

    fn tail_text(&self) -> String {
        match &self.kind {
            NotificationKind::Appeared {
                dimension,
                position,
            } => {
                let mut text = format!(
                    "{} appeared in the {} at {}",
                    self.display_name, dimension, position
                );
                if let Some(observer) = self.observer.as_deref().filter(|o| !o.is_empty()) {
                    text.push_str(" near ");
                    text.push_str(observer);
                }
                text
            }
            NotificationKind::Resolved {
                kind: TerminalKind::Captured,
                actor,
            } => match actor.as_deref().filter(|a| !a.is_empty()) {
                Some(actor) => format!("{} was caught by {}!", self.display_name, actor),
                None => format!("{} was caught!", self.display_name),
            },
            NotificationKind::Resolved {
                kind: TerminalKind::Defeated,
                ..
            } => format!("{} was defeated!", self.display_name),
        }
    }

    /// Rich embed for the webhook.
    pub fn embed(&self, footer_text: &str, thumbnail: Option<String>) -> Embed {
        let type_text = labels::label_displays(&self.labels).join(" ");
        let observer = self
            .observer
            .clone()
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        let (title, description, color, fields) = match &self.kind {
            NotificationKind::Appeared {
                dimension,
                position,
            } => {
                let sparkle = if self.rare_variant { "✨ " } else { "" };
                let title = if type_text.is_empty() {
                    format!("{}{}", sparkle, self.display_name)
                } else {
                    format!("{}{} — {}", sparkle, type_text, self.display_name)
                };
                let color = if self.rare_variant {
                    RARE_VARIANT_COLOR
                } else {
                    APPEARED_COLOR
                };
                let fields = vec![
                    EmbedField::new("Species", &self.display_name),
                    EmbedField::new("Type", &type_text),
                    EmbedField::new("Dimension", &dimension.to_string()),
                    EmbedField::new("Position", &format!("`{}`", position)),
                    EmbedField::new("Closest Player", &observer),
                ];
                (title, Some(APPEARED_DESCRIPTION.to_string()), color, fields)
            }
            NotificationKind::Resolved { kind, actor } => {
                let title = format!("{} — {}", kind, self.display_name);
                let color = match kind {
                    TerminalKind::Captured => CAPTURED_COLOR,
                    TerminalKind::Defeated => DEFEATED_COLOR,
                };
                let mut fields = vec![
                    EmbedField::new("Species", &self.display_name),
                    EmbedField::new("Type", &type_text),
                    EmbedField::new("Outcome", &kind.to_string()),
                ];
                if let Some(actor) = actor.as_deref().filter(|a| !a.is_empty()) {
                    fields.push(EmbedField::new("Player", actor));
                }
                (title, None, color, fields)
            }
        };

        Embed {
            title,
            description,
            color,
            fields,
            thumbnail: thumbnail.map(|url| Thumbnail { url }),
            footer: Footer {
                text: footer_text.to_string(),
            },
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
