//! Structured log events for the herald lifecycle.
//!
//! Every event carries an `event` field with a dotted name so log lines can
//! be filtered without parsing messages. Failures that are swallowed at a
//! component boundary are logged here at `warn!`.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{EntityId, Outcome};

/// RAII guard that tags everything logged while handling one entity.
pub struct EntitySpan {
    _span: tracing::span::EnteredSpan,
}

impl EntitySpan {
    pub fn enter(entity_id: &EntityId) -> Self {
        let span = tracing::info_span!("herald.entity", entity_id = %entity_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_appearance_tracked(entity_id: &EntityId, species: &str, labels: &[String]) {
    info!(
        event = "appearance.tracked",
        entity_id = %entity_id,
        species = %species,
        labels = ?labels,
    );
}

pub fn emit_appearance_skipped(entity_id: &EntityId, species: &str) {
    debug!(event = "appearance.skipped", entity_id = %entity_id, species = %species);
}

pub fn emit_context_unresolved(entity_id: &EntityId, error: &dyn std::fmt::Display) {
    warn!(event = "appearance.context_unresolved", entity_id = %entity_id, error = %error);
}

pub fn emit_resolution(entity_id: &EntityId, species: &str, outcome: Outcome) {
    info!(
        event = "appearance.resolved",
        entity_id = %entity_id,
        species = %species,
        outcome = ?outcome,
    );
}

pub fn emit_terminal_ignored(entity_id: &EntityId) {
    debug!(event = "terminal.ignored", entity_id = %entity_id);
}

pub fn emit_records_swept(count: usize, max_age: Duration) {
    info!(
        event = "appearance.swept",
        count = count,
        max_age_secs = max_age.as_secs(),
    );
}

pub fn emit_lookup_miss(key: &str) {
    debug!(event = "enrichment.miss", key = %key);
}

pub fn emit_lookup_failed(key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "enrichment.failed", key = %key, error = %error);
}

pub fn emit_cache_purged(count: usize) {
    debug!(event = "enrichment.purged", count = count);
}

pub fn emit_delivery_failed(error: &dyn std::fmt::Display) {
    warn!(event = "webhook.failed", error = %error);
}

pub fn emit_rate_limited(retry_after: Duration) {
    info!(
        event = "webhook.rate_limited",
        retry_after_ms = retry_after.as_millis() as u64,
    );
}

pub fn emit_retry_failed(error: &dyn std::fmt::Display) {
    warn!(event = "webhook.retry_failed", error = %error);
}

pub fn emit_webhook_not_configured() {
    info!(event = "webhook.not_configured");
}

pub fn emit_session_skipped(session: &str, error: &dyn std::fmt::Display) {
    warn!(event = "broadcast.session_skipped", session = %session, error = %error);
}
