//! In-memory fakes for the herald's external seams (testing only)
//!
//! Provides sessions that record or reject messages, a scripted webhook
//! transport, and a catalog backed by maps, all with call counters.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::broadcast::{Session, SessionDirectory};
use crate::enrichment::{SpriteCatalog, SpriteSet, Variety};
use crate::error::{CatalogError, DeliveryError, SessionError};
use crate::labels::StyledMessage;
use crate::webhook::{WebhookPayload, WebhookResponse, WebhookTransport};

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session that keeps every message it receives.
#[derive(Debug)]
pub struct RecordingSession {
    name: String,
    messages: Mutex<Vec<StyledMessage>>,
}

impl RecordingSession {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<StyledMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn plain_messages(&self) -> Vec<String> {
        self.messages().iter().map(StyledMessage::plain_text).collect()
    }
}

impl Session for RecordingSession {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn send(&self, message: &StyledMessage) -> Result<(), SessionError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Session whose connection is gone.
#[derive(Debug)]
pub struct FailingSession {
    name: String,
}

impl FailingSession {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Session for FailingSession {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn send(&self, _message: &StyledMessage) -> Result<(), SessionError> {
        Err(SessionError::Disconnected(self.name.clone()))
    }
}

/// Session directory backed by a list.
#[derive(Default)]
pub struct MemorySessions {
    sessions: Mutex<Vec<Arc<dyn Session>>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, session: Arc<dyn Session>) {
        self.sessions.lock().unwrap().push(session);
    }

    pub fn disconnect(&self, name: &str) {
        self.sessions.lock().unwrap().retain(|s| s.name() != name);
    }
}

impl SessionDirectory for MemorySessions {
    fn sessions(&self) -> Vec<Arc<dyn Session>> {
        self.sessions.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub payload: WebhookPayload,
    pub at: Instant,
}

/// Webhook transport that replays queued responses, answering 204 once
/// the script runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<WebhookResponse, DeliveryError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: u16) {
        self.push(Ok(WebhookResponse {
            status,
            retry_after: None,
            body: String::new(),
        }));
    }

    pub fn push_rate_limited(&self, retry_after: Duration) {
        self.push(Ok(WebhookResponse {
            status: 429,
            retry_after: Some(retry_after),
            body: String::new(),
        }));
    }

    pub fn push_network_error(&self, message: &str) {
        self.push(Err(DeliveryError::Network(message.to_string())));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn push(&self, response: Result<WebhookResponse, DeliveryError>) {
        self.script.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn post(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<WebhookResponse, DeliveryError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            payload: payload.clone(),
            at: Instant::now(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(WebhookResponse {
                status: 204,
                retry_after: None,
                body: String::new(),
            }))
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

/// Sprite catalog backed by maps. Keys in the failing set return a
/// network error instead of a result.
#[derive(Default)]
pub struct MemoryCatalog {
    sprites: Mutex<HashMap<String, SpriteSet>>,
    varieties: Mutex<HashMap<String, Vec<Variety>>>,
    failing: Mutex<HashSet<String>>,
    sprite_calls: AtomicUsize,
    variety_calls: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sprites(&self, key: &str, sprites: SpriteSet) {
        self.sprites.lock().unwrap().insert(key.to_string(), sprites);
    }

    pub fn insert_varieties(&self, key: &str, varieties: Vec<Variety>) {
        self.varieties
            .lock()
            .unwrap()
            .insert(key.to_string(), varieties);
    }

    pub fn fail_key(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn heal_key(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    pub fn sprite_calls(&self) -> usize {
        self.sprite_calls.load(Ordering::SeqCst)
    }

    pub fn variety_calls(&self) -> usize {
        self.variety_calls.load(Ordering::SeqCst)
    }

    /// Total catalog requests of either kind.
    pub fn calls(&self) -> usize {
        self.sprite_calls() + self.variety_calls()
    }

    fn check_failing(&self, key: &str) -> Result<(), CatalogError> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(CatalogError::Network(format!("connection reset for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SpriteCatalog for MemoryCatalog {
    async fn sprites(&self, key: &str) -> Result<SpriteSet, CatalogError> {
        self.sprite_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(key)?;
        self.sprites
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                key: key.to_string(),
            })
    }

    async fn varieties(&self, key: &str) -> Result<Vec<Variety>, CatalogError> {
        self.variety_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(key)?;
        self.varieties
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                key: key.to_string(),
            })
    }
}
