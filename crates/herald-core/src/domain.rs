//! Inbound event model and entity identity.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique key for one simulated entity instance.
///
/// This is the only correlation key: appearance and terminal events are
/// matched on it, never on the live entity object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generate a fresh random identity.
    pub fn new() -> Self {
        EntityId(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        EntityId(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// World-space coordinates of an appearance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}, {:.0}, {:.0}", self.x, self.y, self.z)
    }
}

/// A live simulation object that may disappear at any time.
pub trait LiveEntity: Send + Sync {
    fn is_alive(&self) -> bool;
}

/// Non-owning handle to the live entity behind an appearance.
///
/// Only ever probed for liveness. Losing the referent has no effect on
/// correlation.
#[derive(Clone)]
pub struct EntityHandle(Weak<dyn LiveEntity>);

impl EntityHandle {
    pub fn new(entity: &Arc<dyn LiveEntity>) -> Self {
        EntityHandle(Arc::downgrade(entity))
    }

    /// `true` while the entity is still reachable and reports itself alive.
    pub fn is_alive(&self) -> bool {
        self.0.upgrade().map(|e| e.is_alive()).unwrap_or(false)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// An entity appeared in the simulation.
#[derive(Debug, Clone)]
pub struct AppearanceEvent {
    pub entity_id: EntityId,
    /// Raw world descriptor as reported by the simulation
    pub world: String,
    pub position: Position,
    /// Labels attached to the entity's form
    pub candidate_labels: Vec<String>,
    pub is_rare_variant: bool,
    /// Canonical species identifier, used for catalog lookups
    pub species_id: String,
    /// Localised species name
    pub species_display_name: String,
    pub form_suffix: Option<String>,
    pub nearest_observer: Option<String>,
    pub entity: Option<EntityHandle>,
}

/// How tracking of an entity ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    Captured,
    Defeated,
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalKind::Captured => write!(f, "Captured"),
            TerminalKind::Defeated => write!(f, "Defeated"),
        }
    }
}

/// An entity was captured or defeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalEvent {
    pub entity_id: EntityId,
    pub kind: TerminalKind,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Final state of an appearance record. Set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Captured,
    Defeated,
    Expired,
}

impl From<TerminalKind> for Outcome {
    fn from(kind: TerminalKind) -> Self {
        match kind {
            TerminalKind::Captured => Outcome::Captured,
            TerminalKind::Defeated => Outcome::Defeated,
        }
    }
}
