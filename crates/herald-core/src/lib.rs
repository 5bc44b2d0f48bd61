//! Herald Core
//!
//! Watches entity lifecycle events from a live simulation, decides which
//! appearances are notable, and announces them (and later their capture or
//! defeat) to connected sessions and to a webhook.
//!
//! ## Components
//!
//! - `correlator`: classifies appearances and matches terminal events by identity
//! - `labels`: renders category labels into styled announcement text
//! - `broadcast`: synchronous fan-out to connected sessions
//! - `webhook`: embed payloads and rate-limit aware delivery
//! - `enrichment`: TTL-cached sprite lookups against the catalog
//! - `lane`: the single background worker all outbound HTTP runs on
//! - `config`: the notification settings and their persistence

pub mod broadcast;
pub mod config;
pub mod correlator;
pub mod domain;
pub mod enrichment;
mod error;
pub mod fakes;
mod herald;
pub mod labels;
pub mod lane;
pub mod notification;
pub mod obs;
pub mod telemetry;
pub mod webhook;
pub mod world;

pub use broadcast::{LocalBroadcaster, Session, SessionDirectory};
pub use config::{ConfigStore, NotificationConfig, SpritePair, WEBHOOK_PLACEHOLDER};
pub use correlator::{
    classify, AppearanceDecision, AppearanceRecord, SpawnCorrelator, TerminalDecision,
};
pub use domain::{
    AppearanceEvent, EntityHandle, EntityId, LiveEntity, Outcome, Position, TerminalEvent,
    TerminalKind,
};
pub use enrichment::{
    normalize_catalog_key, EnrichmentCache, PokeApiCatalog, SpriteCatalog, SpriteSet, Variety,
};
pub use error::{
    CatalogError, ConfigError, ContextError, DeliveryError, HeraldError, SessionError,
};
pub use herald::{Herald, HeraldBuilder, HOUSEKEEPING_INTERVAL};
pub use labels::{render, Segment, StyledMessage};
pub use lane::IoLane;
pub use notification::{Notification, NotificationKind};
pub use obs::EntitySpan;
pub use telemetry::init_tracing;
pub use webhook::{
    send_with_retry, Delivery, DispatchOutcome, HttpTransport, WebhookDispatcher,
    WebhookPayload, WebhookTransport,
};
pub use world::{Dimension, DimensionKeyResolver, PlainNameResolver, WorldResolver};
