//! Spawn Herald CLI
//!
//! The `herald` command drives the notification core outside a live host.
//!
//! ## Commands
//!
//! - `replay`: feed a JSON-lines event stream through the correlator
//! - `config`: show or edit the notification settings
//! - `sprite`: resolve a species thumbnail through the catalog

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use herald_core::{
    normalize_catalog_key, AppearanceDecision, AppearanceEvent, ConfigStore, EnrichmentCache,
    EntityId, Herald, NotificationConfig, PokeApiCatalog, Position, Session, SessionDirectory,
    SessionError, StyledMessage, TerminalDecision, TerminalEvent,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "herald")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Spawn Herald notification harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Notification config file
    #[arg(short, long, global = true, default_value = "spawn-herald.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event stream, printing local broadcasts
    Replay {
        /// Event file (default: stdin)
        #[arg(short, long)]
        events: Option<PathBuf>,
    },

    /// Show or edit the notification settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Resolve the thumbnail URL for a species
    Sprite {
        /// Species name as shown in game
        species: String,

        /// Look up the rare-variant image
        #[arg(long)]
        shiny: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Set the webhook URL
    SetWebhook { url: String },
    /// Turn webhook notifications on or off
    Webhook { state: Toggle },
    /// Turn embed thumbnails on or off
    Thumbnails { state: Toggle },
    /// Turn in-session broadcasts on or off
    Local { state: Toggle },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Toggle::On
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    herald_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Replay { events } => cmd_replay(&cli.config, events.as_deref()).await,
        Commands::Config { action } => cmd_config(&cli.config, action),
        Commands::Sprite { species, shiny } => cmd_sprite(&cli.config, &species, shiny).await,
    }
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

/// One line of a replay stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputEvent {
    Appearance(AppearanceInput),
    Terminal(TerminalEvent),
}

#[derive(Debug, Deserialize)]
struct AppearanceInput {
    entity_id: EntityId,
    world: String,
    position: Position,
    species: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    shiny: bool,
    #[serde(default)]
    form: Option<String>,
    #[serde(default)]
    observer: Option<String>,
}

impl From<AppearanceInput> for AppearanceEvent {
    fn from(input: AppearanceInput) -> Self {
        AppearanceEvent {
            entity_id: input.entity_id,
            world: input.world,
            position: input.position,
            candidate_labels: input.labels,
            is_rare_variant: input.shiny,
            species_display_name: input.display_name.unwrap_or_else(|| input.species.clone()),
            species_id: input.species,
            form_suffix: input.form,
            nearest_observer: input.observer,
            entity: None,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayStats {
    tracked: usize,
    skipped: usize,
    resolved: usize,
    ignored: usize,
    malformed: usize,
}

/// Prints broadcasts to stdout.
struct ConsoleSession;

impl Session for ConsoleSession {
    fn name(&self) -> String {
        "console".to_string()
    }

    fn send(&self, message: &StyledMessage) -> Result<(), SessionError> {
        println!("{}", message.plain_text());
        Ok(())
    }
}

struct Console;

impl SessionDirectory for Console {
    fn sessions(&self) -> Vec<Arc<dyn Session>> {
        vec![Arc::new(ConsoleSession)]
    }
}

async fn cmd_replay(config_path: &Path, events: Option<&Path>) -> Result<()> {
    let store = ConfigStore::open(config_path)
        .with_context(|| format!("Failed to open config {:?}", config_path))?;
    let herald = Herald::builder(Arc::new(store), Arc::new(Console))
        .build()
        .context("Failed to start herald")?;

    let stats = match events {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open events {:?}", path))?;
            replay_events(&herald, BufReader::new(file))?
        }
        None => replay_events(&herald, std::io::stdin().lock())?,
    };

    herald.shutdown().await;

    info!(
        tracked = stats.tracked,
        resolved = stats.resolved,
        "replay finished"
    );
    println!(
        "{} tracked, {} skipped, {} resolved, {} ignored, {} malformed",
        stats.tracked, stats.skipped, stats.resolved, stats.ignored, stats.malformed
    );
    Ok(())
}

/// Feed every line of `reader` to the correlator. Malformed lines are
/// logged and counted; reading stops only on an I/O error.
fn replay_events<R: BufRead>(herald: &Herald, reader: R) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read event stream")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: InputEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping malformed event");
                stats.malformed += 1;
                continue;
            }
        };

        match event {
            InputEvent::Appearance(input) => {
                match herald.correlator.on_appearance(input.into()) {
                    AppearanceDecision::Tracked(_) => stats.tracked += 1,
                    _ => stats.skipped += 1,
                }
            }
            InputEvent::Terminal(terminal) => match herald.correlator.on_terminal(terminal) {
                TerminalDecision::Resolved(_) => stats.resolved += 1,
                TerminalDecision::Unknown => stats.ignored += 1,
            },
        }
    }

    Ok(stats)
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config(config_path: &Path, action: ConfigAction) -> Result<()> {
    let store = ConfigStore::open(config_path)
        .with_context(|| format!("Failed to open config {:?}", config_path))?;
    let config = apply_config_action(&store, action)?;

    if let Some(path) = store.path() {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn apply_config_action(store: &ConfigStore, action: ConfigAction) -> Result<NotificationConfig> {
    let config = match action {
        ConfigAction::Show => store.snapshot(),
        ConfigAction::SetWebhook { url } => store
            .set_webhook_url(&url)
            .context("Failed to set webhook URL")?,
        ConfigAction::Webhook { state } => store.set_webhook_enabled(state.enabled())?,
        ConfigAction::Thumbnails { state } => store.set_thumbnails_enabled(state.enabled())?,
        ConfigAction::Local { state } => store.set_local_enabled(state.enabled())?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// sprite
// ---------------------------------------------------------------------------

async fn cmd_sprite(config_path: &Path, species: &str, shiny: bool) -> Result<()> {
    let store = ConfigStore::open(config_path)
        .with_context(|| format!("Failed to open config {:?}", config_path))?;
    let catalog = PokeApiCatalog::new(&store.snapshot().catalog_base_url)?;
    let cache = EnrichmentCache::new(Arc::new(catalog));

    match cache.lookup(species, shiny).await {
        Some(url) => println!("{}", url),
        None => println!(
            "No sprite found for '{}' (key: {})",
            species,
            normalize_catalog_key(species)
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use herald_core::fakes::{MemoryCatalog, MemorySessions, RecordingSession, ScriptedTransport};
    use std::io::Cursor;
    use uuid::Uuid;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_config_toggle() {
        let cli = Cli::try_parse_from(["herald", "config", "webhook", "off"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Webhook { state: Toggle::Off }
            }
        ));
        assert_eq!(cli.config, PathBuf::from("spawn-herald.json"));
    }

    #[test]
    fn parses_tagged_events() {
        let id = Uuid::new_v4();
        let appearance = format!(
            r#"{{"type":"appearance","entity_id":"{id}","world":"minecraft:overworld","position":{{"x":1.0,"y":2.0,"z":3.0}},"species":"zapdos","labels":["legendary"]}}"#
        );
        let InputEvent::Appearance(input) = serde_json::from_str::<InputEvent>(&appearance).unwrap()
        else {
            panic!("expected appearance");
        };
        let event = AppearanceEvent::from(input);
        assert_eq!(event.species_display_name, "zapdos");
        assert!(!event.is_rare_variant);

        let terminal = format!(r#"{{"type":"terminal","entity_id":"{id}","kind":"captured"}}"#);
        assert!(matches!(
            serde_json::from_str::<InputEvent>(&terminal).unwrap(),
            InputEvent::Terminal(_)
        ));
    }

    #[tokio::test]
    async fn replay_counts_each_decision() {
        let player = Arc::new(RecordingSession::new("Ash"));
        let sessions = MemorySessions::new();
        sessions.connect(player.clone());
        let transport = Arc::new(ScriptedTransport::new());
        let config = NotificationConfig {
            webhook_url: "https://hooks.example/replay".into(),
            ..Default::default()
        };
        let herald = Herald::builder(Arc::new(ConfigStore::in_memory(config)), Arc::new(sessions))
            .transport(transport.clone())
            .catalog(Arc::new(MemoryCatalog::new()))
            .build()
            .unwrap();

        let rare = Uuid::new_v4();
        let plain = Uuid::new_v4();
        let stream = format!(
            concat!(
                r#"{{"type":"appearance","entity_id":"{rare}","world":"minecraft:overworld","position":{{"x":0,"y":70,"z":0}},"species":"mewtwo","display_name":"Mewtwo","labels":["legendary"],"shiny":true}}"#,
                "\n\n",
                r#"{{"type":"appearance","entity_id":"{plain}","world":"minecraft:overworld","position":{{"x":0,"y":70,"z":0}},"species":"pidgey"}}"#,
                "\nnot json\n",
                r#"{{"type":"terminal","entity_id":"{rare}","kind":"captured","actor":"Ash"}}"#,
                "\n",
                r#"{{"type":"terminal","entity_id":"{rare}","kind":"defeated"}}"#,
                "\n"
            ),
            rare = rare,
            plain = plain
        );

        let stats = replay_events(&herald, Cursor::new(stream)).unwrap();
        assert_eq!(
            stats,
            ReplayStats {
                tracked: 1,
                skipped: 1,
                resolved: 1,
                ignored: 1,
                malformed: 1,
            }
        );

        herald.shutdown().await;
        assert_eq!(player.messages().len(), 2);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn config_actions_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.json");
        let store = ConfigStore::open(&path).unwrap();

        let config = apply_config_action(
            &store,
            ConfigAction::SetWebhook {
                url: "https://hooks.example/1".into(),
            },
        )
        .unwrap();
        assert_eq!(config.webhook_url, "https://hooks.example/1");

        apply_config_action(&store, ConfigAction::Thumbnails { state: Toggle::Off }).unwrap();
        let reopened = ConfigStore::open(&path).unwrap().snapshot();
        assert!(!reopened.thumbnails_enabled);
        assert_eq!(reopened.webhook_url, "https://hooks.example/1");

        let err = apply_config_action(
            &store,
            ConfigAction::SetWebhook {
                url: "ftp://nope".into(),
            },
        );
        assert!(err.is_err());
    }
}
