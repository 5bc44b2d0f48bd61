//! End-to-end correlation tests: appearance -> terminal through both
//! notification channels, using in-memory sessions, transport and catalog.

use std::sync::Arc;
use std::time::Duration;

use herald_core::fakes::{MemoryCatalog, MemorySessions, RecordingSession, ScriptedTransport};
use herald_core::{
    AppearanceDecision, AppearanceEvent, ConfigStore, EntityHandle, EntityId, Herald, LiveEntity,
    NotificationConfig, Outcome, Position, SpriteSet, TerminalDecision, TerminalEvent,
    TerminalKind, HOUSEKEEPING_INTERVAL,
};
use herald_core::enrichment::CACHE_TTL;

const HOOK: &str = "https://hooks.example/webhook/1";

struct Harness {
    herald: Herald,
    player: Arc<RecordingSession>,
    transport: Arc<ScriptedTransport>,
    catalog: Arc<MemoryCatalog>,
}

fn configured() -> NotificationConfig {
    NotificationConfig {
        webhook_url: HOOK.to_string(),
        ..Default::default()
    }
}

fn harness(config: NotificationConfig) -> Harness {
    harness_with(config, Some(HOUSEKEEPING_INTERVAL))
}

fn harness_with(config: NotificationConfig, housekeeping: Option<Duration>) -> Harness {
    let player = Arc::new(RecordingSession::new("Ash"));
    let sessions = MemorySessions::new();
    sessions.connect(player.clone());

    let transport = Arc::new(ScriptedTransport::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let herald = Herald::builder(
        Arc::new(ConfigStore::in_memory(config)),
        Arc::new(sessions),
    )
    .transport(transport.clone())
    .catalog(catalog.clone())
    .housekeeping(housekeeping)
    .build()
    .expect("build herald");

    Harness {
        herald,
        player,
        transport,
        catalog,
    }
}

fn appearance(id: EntityId, rare: bool, labels: &[&str]) -> AppearanceEvent {
    AppearanceEvent {
        entity_id: id,
        world: "minecraft:overworld".to_string(),
        position: Position::new(100.0, 64.0, -20.0),
        candidate_labels: labels.iter().map(|l| l.to_string()).collect(),
        is_rare_variant: rare,
        species_id: "mewtwo".to_string(),
        species_display_name: "Mewtwo".to_string(),
        form_suffix: None,
        nearest_observer: Some("Ash".to_string()),
        entity: None,
    }
}

fn terminal(id: EntityId, kind: TerminalKind) -> TerminalEvent {
    TerminalEvent {
        entity_id: id,
        kind,
        actor: Some("Ash".to_string()),
    }
}

#[tokio::test]
async fn rare_legendary_is_announced_then_resolved_once() {
    let h = harness(configured());
    let correlator = &h.herald.correlator;
    let id = EntityId::new();

    let decision = correlator.on_appearance(appearance(id, true, &["legendary"]));
    assert_eq!(
        decision,
        AppearanceDecision::Tracked(vec!["shiny".to_string(), "legendary".to_string()])
    );
    assert_eq!(correlator.tracked_count(), 1);
    assert_eq!(h.player.messages().len(), 1);
    assert_eq!(
        h.player.messages()[0].styled_segments().count(),
        2,
        "both labels rendered"
    );

    h.herald.lane.drain().await;
    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, HOOK);
    assert_eq!(requests[0].payload.embeds[0].title, "✨ Shiny Legendary — Mewtwo");

    let resolved = correlator.on_terminal(terminal(id, TerminalKind::Captured));
    assert_eq!(resolved, TerminalDecision::Resolved(Outcome::Captured));
    assert_eq!(correlator.tracked_count(), 0);
    assert_eq!(
        h.player.plain_messages()[1],
        "Shiny Legendary Mewtwo was caught by Ash!"
    );

    h.herald.lane.drain().await;
    assert_eq!(h.transport.request_count(), 2);
    assert_eq!(
        h.transport.requests()[1].payload.embeds[0].title,
        "Captured — Mewtwo"
    );

    let repeat = correlator.on_terminal(terminal(id, TerminalKind::Captured));
    assert_eq!(repeat, TerminalDecision::Unknown);
    h.herald.lane.drain().await;
    assert_eq!(h.player.messages().len(), 2);
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test]
async fn defeat_after_capture_is_ignored() {
    let h = harness(configured());
    let correlator = &h.herald.correlator;
    let id = EntityId::new();

    correlator.on_appearance(appearance(id, false, &["legendary"]));
    assert_eq!(
        correlator.on_terminal(terminal(id, TerminalKind::Defeated)),
        TerminalDecision::Resolved(Outcome::Defeated)
    );
    assert_eq!(
        correlator.on_terminal(terminal(id, TerminalKind::Captured)),
        TerminalDecision::Unknown
    );
    assert_eq!(
        h.player.plain_messages().last().unwrap(),
        "Legendary Mewtwo was defeated!"
    );
}

#[tokio::test]
async fn unknown_identity_is_a_noop() {
    let h = harness(configured());
    let decision = h
        .herald
        .correlator
        .on_terminal(terminal(EntityId::new(), TerminalKind::Defeated));
    assert_eq!(decision, TerminalDecision::Unknown);

    h.herald.lane.drain().await;
    assert!(h.player.messages().is_empty());
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn ordinary_spawn_is_not_tracked() {
    let h = harness(configured());
    let correlator = &h.herald.correlator;
    let id = EntityId::new();

    assert_eq!(
        correlator.on_appearance(appearance(id, false, &["gen1", "alolan_form"])),
        AppearanceDecision::Skipped
    );
    assert_eq!(correlator.tracked_count(), 0);

    // A terminal event for an untracked identity stays silent.
    assert_eq!(
        correlator.on_terminal(terminal(id, TerminalKind::Captured)),
        TerminalDecision::Unknown
    );
    h.herald.lane.drain().await;
    assert!(h.player.messages().is_empty());
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn unresolvable_world_discards_event() {
    let h = harness(configured());
    let mut event = appearance(EntityId::new(), true, &[]);
    event.world = "mymod:sky_islands".to_string();

    assert_eq!(
        h.herald.correlator.on_appearance(event),
        AppearanceDecision::Unresolved
    );
    assert_eq!(h.herald.correlator.tracked_count(), 0);
    assert!(h.player.messages().is_empty());
}

#[tokio::test]
async fn non_finite_position_discards_event() {
    let h = harness(configured());
    let mut event = appearance(EntityId::new(), true, &[]);
    event.position = Position::new(f64::NAN, 64.0, 0.0);

    assert_eq!(
        h.herald.correlator.on_appearance(event),
        AppearanceDecision::Unresolved
    );
}

#[tokio::test]
async fn duplicate_appearance_announces_once() {
    let h = harness(configured());
    let id = EntityId::new();

    h.herald
        .correlator
        .on_appearance(appearance(id, true, &[]));
    assert_eq!(
        h.herald.correlator.on_appearance(appearance(id, true, &[])),
        AppearanceDecision::AlreadyTracked
    );

    h.herald.lane.drain().await;
    assert_eq!(h.player.messages().len(), 1);
    assert_eq!(h.transport.request_count(), 1);
}

#[tokio::test]
async fn placeholder_webhook_raises_local_notice() {
    let h = harness(NotificationConfig::default());
    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), true, &[]));

    h.herald.lane.drain().await;
    let messages = h.player.plain_messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].starts_with("[Herald] Webhook is not configured"));
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn disabled_webhook_is_silent() {
    let h = harness(NotificationConfig {
        webhook_enabled: false,
        ..configured()
    });
    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), true, &[]));

    h.herald.lane.drain().await;
    assert_eq!(h.player.messages().len(), 1);
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn disabled_local_broadcast_still_sends_webhook() {
    let h = harness(NotificationConfig {
        local_enabled: false,
        ..configured()
    });
    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), true, &[]));

    h.herald.lane.drain().await;
    assert!(h.player.messages().is_empty());
    assert_eq!(h.transport.request_count(), 1);
}

#[tokio::test]
async fn thumbnail_is_resolved_and_remembered() {
    let h = harness(configured());
    h.catalog.insert_sprites(
        "mewtwo",
        SpriteSet {
            front_default: Some("https://img/mewtwo.png".into()),
            front_shiny: Some("https://img/mewtwo-shiny.png".into()),
            ..Default::default()
        },
    );

    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), true, &[]));
    h.herald.lane.drain().await;

    let embed = &h.transport.requests()[0].payload.embeds[0];
    assert_eq!(
        embed.thumbnail.as_ref().map(|t| t.url.as_str()),
        Some("https://img/mewtwo-shiny.png")
    );
    let pair = h.herald.config.snapshot().sprites["mewtwo"].clone();
    assert_eq!(pair.variant.as_deref(), Some("https://img/mewtwo-shiny.png"));

    // Next time the configured URL is used without touching the catalog.
    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), true, &[]));
    h.herald.lane.drain().await;
    assert_eq!(h.catalog.sprite_calls(), 1);
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test]
async fn thumbnails_disabled_skips_catalog() {
    let h = harness(NotificationConfig {
        thumbnails_enabled: false,
        ..configured()
    });
    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), false, &["legendary"]));
    h.herald.lane.drain().await;

    assert!(h.transport.requests()[0].payload.embeds[0].thumbnail.is_none());
    assert_eq!(h.catalog.calls(), 0);
}

#[tokio::test]
async fn wanted_shiny_label_does_not_make_spawn_rare() {
    let h = harness(NotificationConfig {
        wanted_labels: vec!["shiny".into()],
        thumbnails_enabled: false,
        ..configured()
    });
    let id = EntityId::new();
    let decision = h
        .herald
        .correlator
        .on_appearance(appearance(id, false, &["shiny"]));
    assert_eq!(decision, AppearanceDecision::Tracked(vec!["shiny".to_string()]));
    assert!(!h.herald.correlator.record(&id).unwrap().is_rare_variant());

    h.herald.lane.drain().await;
    let embed = &h.transport.requests()[0].payload.embeds[0];
    assert!(!embed.title.starts_with('✨'));
    assert_eq!(embed.color, 0xF1C40F);
}

#[tokio::test]
async fn form_suffix_appears_in_display_name() {
    let h = harness(configured());
    let mut event = appearance(EntityId::new(), false, &["legendary", "galarian_form"]);
    event.species_id = "zapdos".into();
    event.species_display_name = "Zapdos".into();
    h.herald.correlator.on_appearance(event);

    assert!(h.player.plain_messages()[0].starts_with("Legendary Zapdos (Galarian) appeared"));
}

struct Wild;

impl LiveEntity for Wild {
    fn is_alive(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn losing_the_entity_does_not_break_correlation() {
    let h = harness(configured());
    let id = EntityId::new();
    let entity: Arc<dyn LiveEntity> = Arc::new(Wild);

    let mut event = appearance(id, true, &[]);
    event.entity = Some(EntityHandle::new(&entity));
    h.herald.correlator.on_appearance(event);
    assert_eq!(
        h.herald.correlator.record(&id).unwrap().entity_alive(),
        Some(true)
    );

    // Captured entities leave the world before the capture event lands.
    drop(entity);
    assert_eq!(
        h.herald.correlator.record(&id).unwrap().entity_alive(),
        Some(false)
    );
    assert_eq!(
        h.herald
            .correlator
            .on_terminal(terminal(id, TerminalKind::Captured)),
        TerminalDecision::Resolved(Outcome::Captured)
    );
}

#[tokio::test(start_paused = true)]
async fn stale_records_are_swept_silently() {
    let h = harness_with(configured(), None);
    let old = EntityId::new();
    let fresh = EntityId::new();

    h.herald.correlator.on_appearance(appearance(old, true, &[]));
    tokio::time::advance(Duration::from_secs(20 * 60)).await;
    h.herald
        .correlator
        .on_appearance(appearance(fresh, true, &[]));
    tokio::time::advance(Duration::from_secs(11 * 60)).await;

    let swept = h.herald.correlator.sweep_stale(Duration::from_secs(30 * 60));
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].entity_id, old);
    assert_eq!(swept[0].outcome(), Some(Outcome::Expired));
    assert_eq!(h.herald.correlator.tracked_count(), 1);

    let before = h.player.messages().len();
    assert_eq!(
        h.herald
            .correlator
            .on_terminal(terminal(old, TerminalKind::Captured)),
        TerminalDecision::Unknown
    );
    assert_eq!(h.player.messages().len(), before);
}

#[tokio::test(start_paused = true)]
async fn housekeeping_sweeps_records_and_purges_cache() {
    let h = harness(NotificationConfig {
        stale_after_secs: 120,
        ..configured()
    });
    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), true, &[]));
    h.herald.lane.drain().await;
    assert!(!h.herald.enrichment.is_empty());

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(h.herald.correlator.tracked_count(), 1);

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(h.herald.correlator.tracked_count(), 0);

    tokio::time::sleep(CACHE_TTL).await;
    assert!(h.herald.enrichment.is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_housekeeping() {
    let h = harness(NotificationConfig {
        stale_after_secs: 60,
        ..configured()
    });
    h.herald.shutdown().await;

    h.herald
        .correlator
        .on_appearance(appearance(EntityId::new(), true, &[]));
    tokio::time::sleep(HOUSEKEEPING_INTERVAL * 5).await;
    assert_eq!(h.herald.correlator.tracked_count(), 1);
}

#[tokio::test]
async fn concurrent_terminal_events_resolve_once() {
    let h = harness(configured());
    let id = EntityId::new();
    h.herald.correlator.on_appearance(appearance(id, true, &[]));

    let threads: Vec<_> = (0..8)
        .map(|i| {
            let correlator = Arc::clone(&h.herald.correlator);
            let kind = if i % 2 == 0 {
                TerminalKind::Captured
            } else {
                TerminalKind::Defeated
            };
            std::thread::spawn(move || correlator.on_terminal(terminal(id, kind)))
        })
        .collect();

    let resolved = threads
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|d| matches!(d, TerminalDecision::Resolved(_)))
        .count();
    assert_eq!(resolved, 1);

    h.herald.lane.drain().await;
    assert_eq!(h.player.messages().len(), 2);
    assert_eq!(h.transport.request_count(), 2);
}
