//! Spawn correlation.
//!
//! The correlator decides whether an appearance is notable, announces it,
//! and remembers it by [`EntityId`] until a capture or defeat for the same
//! identity arrives. The terminal event consumes the record, so each
//! identity yields at most one appearance and one resolution notification.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::broadcast::LocalBroadcaster;
use crate::config::ConfigStore;
use crate::domain::{AppearanceEvent, EntityHandle, EntityId, Outcome, TerminalEvent};
use crate::error::ContextError;
use crate::labels::{normalize_label, RARE_VARIANT_LABEL};
use crate::notification::{Notification, NotificationKind};
use crate::obs::{self, EntitySpan};
use crate::webhook::WebhookDispatcher;
use crate::world::{Dimension, WorldResolver};

/// A notable appearance awaiting its terminal event.
#[derive(Debug, Clone)]
pub struct AppearanceRecord {
    pub entity_id: EntityId,
    /// Normalized category labels, rare-variant first
    pub labels: Vec<String>,
    pub species_id: String,
    pub display_name: String,
    pub observer: Option<String>,
    pub spawned_at: DateTime<Utc>,
    rare_variant: bool,
    created_at: Instant,
    outcome: Option<Outcome>,
    entity: Option<EntityHandle>,
}

impl AppearanceRecord {
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// As reported by the appearance event, independent of `labels`.
    pub fn is_rare_variant(&self) -> bool {
        self.rare_variant
    }

    /// Liveness of the entity behind the record, if a handle was supplied.
    pub fn entity_alive(&self) -> Option<bool> {
        self.entity.as_ref().map(EntityHandle::is_alive)
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Set the outcome. Only the first call has any effect.
    fn settle(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    fn notification(&self, kind: NotificationKind) -> Notification {
        Notification {
            entity_id: self.entity_id,
            species_id: self.species_id.clone(),
            display_name: self.display_name.clone(),
            labels: self.labels.clone(),
            rare_variant: self.is_rare_variant(),
            observer: self.observer.clone(),
            kind,
        }
    }
}

/// What happened to an appearance event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppearanceDecision {
    /// Notable: announced and stored with these labels
    Tracked(Vec<String>),
    /// Not notable
    Skipped,
    /// Identity already tracked; nothing announced
    AlreadyTracked,
    /// World or position could not be resolved
    Unresolved,
}

/// What happened to a terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalDecision {
    Resolved(Outcome),
    /// Never tracked, already resolved, or swept
    Unknown,
}

/// Labels a notable appearance carries, or an empty list if it is not
/// notable.
///
/// The first candidate label found in `wanted` is kept, preceded by the
/// rare-variant label when `is_rare_variant` is set.
pub fn classify<S: AsRef<str>>(
    candidates: &[S],
    is_rare_variant: bool,
    wanted: &[String],
) -> Vec<String> {
    let wanted: Vec<String> = wanted.iter().map(|w| normalize_label(w)).collect();
    let matched = candidates
        .iter()
        .map(|c| normalize_label(c.as_ref()))
        .find(|c| wanted.contains(c));

    let mut labels = Vec::with_capacity(2);
    if is_rare_variant {
        labels.push(RARE_VARIANT_LABEL.to_string());
    }
    if let Some(label) = matched {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Form name derived from a label such as `alolan_form`.
pub fn form_from_labels<S: AsRef<str>>(labels: &[S]) -> Option<String> {
    labels.iter().find_map(|label| {
        let label = label.as_ref();
        let idx = label.to_ascii_lowercase().find("_form")?;
        let stem = &label[..idx];
        let mut chars = stem.chars();
        let first = chars.next()?;
        Some(first.to_uppercase().chain(chars).collect())
    })
}

fn display_name(event: &AppearanceEvent) -> String {
    let form = event
        .form_suffix
        .clone()
        .filter(|f| !f.trim().is_empty())
        .or_else(|| form_from_labels(&event.candidate_labels));
    match form {
        Some(form) => format!("{} ({})", event.species_display_name, form),
        None => event.species_display_name.clone(),
    }
}

/// Correlates appearances with their terminal events and drives both
/// notification channels.
pub struct SpawnCorrelator {
    config: Arc<ConfigStore>,
    resolver: Arc<dyn WorldResolver>,
    broadcaster: Arc<LocalBroadcaster>,
    dispatcher: Arc<WebhookDispatcher>,
    tracked: Mutex<HashMap<EntityId, AppearanceRecord>>,
}

impl SpawnCorrelator {
    pub fn new(
        config: Arc<ConfigStore>,
        resolver: Arc<dyn WorldResolver>,
        broadcaster: Arc<LocalBroadcaster>,
        dispatcher: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            config,
            resolver,
            broadcaster,
            dispatcher,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Handle an appearance. Notable ones are announced on both channels
    /// and stored for correlation.
    pub fn on_appearance(&self, event: AppearanceEvent) -> AppearanceDecision {
        let _span = EntitySpan::enter(&event.entity_id);

        let dimension = match self.resolve_context(&event) {
            Ok(d) => d,
            Err(e) => {
                obs::emit_context_unresolved(&event.entity_id, &e);
                return AppearanceDecision::Unresolved;
            }
        };

        let wanted = self.config.snapshot().wanted_labels;
        let labels = classify(&event.candidate_labels, event.is_rare_variant, &wanted);
        if labels.is_empty() {
            obs::emit_appearance_skipped(&event.entity_id, &event.species_id);
            return AppearanceDecision::Skipped;
        }

        let record = AppearanceRecord {
            entity_id: event.entity_id,
            labels: labels.clone(),
            species_id: event.species_id.clone(),
            display_name: display_name(&event),
            observer: event.nearest_observer.clone().filter(|o| !o.is_empty()),
            spawned_at: Utc::now(),
            rare_variant: event.is_rare_variant,
            created_at: Instant::now(),
            outcome: None,
            entity: event.entity.clone(),
        };
        let notification = record.notification(NotificationKind::Appeared {
            dimension,
            position: event.position,
        });

        match self.lock().entry(event.entity_id) {
            Entry::Occupied(_) => return AppearanceDecision::AlreadyTracked,
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }

        obs::emit_appearance_tracked(&event.entity_id, &event.species_id, &labels);
        self.announce(notification);
        AppearanceDecision::Tracked(labels)
    }

    /// Handle a capture or defeat. Consumes the matching record, if any,
    /// and announces the resolution exactly once.
    pub fn on_terminal(&self, event: TerminalEvent) -> TerminalDecision {
        let _span = EntitySpan::enter(&event.entity_id);
        let outcome = Outcome::from(event.kind);

        // Removal under the lock is what makes a second terminal event a no-op.
        let removed = self.lock().remove(&event.entity_id);
        let Some(mut record) = removed else {
            obs::emit_terminal_ignored(&event.entity_id);
            return TerminalDecision::Unknown;
        };
        if !record.settle(outcome) {
            obs::emit_terminal_ignored(&event.entity_id);
            return TerminalDecision::Unknown;
        }

        obs::emit_resolution(&record.entity_id, &record.species_id, outcome);
        self.announce(record.notification(NotificationKind::Resolved {
            kind: event.kind,
            actor: event.actor,
        }));
        TerminalDecision::Resolved(outcome)
    }

    /// Drop records older than `max_age`, marking them expired. Nothing is
    /// announced for them.
    pub fn sweep_stale(&self, max_age: Duration) -> Vec<AppearanceRecord> {
        let mut swept = Vec::new();
        {
            let mut tracked = self.lock();
            let stale: Vec<EntityId> = tracked
                .values()
                .filter(|r| r.age() >= max_age)
                .map(|r| r.entity_id)
                .collect();
            for id in stale {
                if let Some(mut record) = tracked.remove(&id) {
                    record.settle(Outcome::Expired);
                    swept.push(record);
                }
            }
        }
        if !swept.is_empty() {
            obs::emit_records_swept(swept.len(), max_age);
        }
        swept
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().len()
    }

    pub fn record(&self, entity_id: &EntityId) -> Option<AppearanceRecord> {
        self.lock().get(entity_id).cloned()
    }

    fn resolve_context(
        &self,
        event: &AppearanceEvent,
    ) -> Result<Dimension, ContextError> {
        let dimension = self.resolver.resolve_world(&event.world)?;
        if !event.position.is_finite() {
            return Err(ContextError::InvalidPosition(format!("{:?}", event.position)));
        }
        Ok(dimension)
    }

    fn announce(&self, notification: Notification) {
        self.broadcaster.broadcast(&notification.local_message());
        self.dispatcher.dispatch(notification);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntityId, AppearanceRecord>> {
        self.tracked.lock().unwrap_or_else(|p| p.into_inner())
    }
}
