//! Wiring of the herald components around one config store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::broadcast::{LocalBroadcaster, SessionDirectory};
use crate::config::ConfigStore;
use crate::correlator::SpawnCorrelator;
use crate::enrichment::{EnrichmentCache, PokeApiCatalog, SpriteCatalog};
use crate::error::HeraldError;
use crate::lane::IoLane;
use crate::obs;
use crate::webhook::{HttpTransport, WebhookDispatcher, WebhookTransport};
use crate::world::{DimensionKeyResolver, WorldResolver};

/// Default interval of the housekeeping task started by
/// [`HeraldBuilder::build`].
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// All components, sharing one config store and one I/O lane.
pub struct Herald {
    pub config: Arc<ConfigStore>,
    pub lane: Arc<IoLane>,
    pub broadcaster: Arc<LocalBroadcaster>,
    pub enrichment: Arc<EnrichmentCache>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub correlator: Arc<SpawnCorrelator>,
    housekeeping: Mutex<Option<JoinHandle<()>>>,
}

impl Herald {
    pub fn builder(
        config: Arc<ConfigStore>,
        sessions: Arc<dyn SessionDirectory>,
    ) -> HeraldBuilder {
        HeraldBuilder {
            config,
            sessions,
            transport: None,
            catalog: None,
            resolver: Arc::new(DimensionKeyResolver),
            housekeeping: Some(HOUSEKEEPING_INTERVAL),
        }
    }

    /// Stop housekeeping, let queued deliveries finish, then stop the lane.
    pub async fn shutdown(&self) {
        self.stop_housekeeping();
        self.lane.drain().await;
        self.lane.shutdown().await;
    }

    fn stop_housekeeping(&self) {
        let handle = self
            .housekeeping
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for Herald {
    fn drop(&mut self) {
        self.stop_housekeeping();
    }
}

/// Every `every`: sweep records older than the configured age and drop
/// expired enrichment entries. The first pass runs one interval after start.
fn spawn_housekeeping(
    config: Arc<ConfigStore>,
    correlator: Arc<SpawnCorrelator>,
    enrichment: Arc<EnrichmentCache>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            correlator.sweep_stale(config.snapshot().stale_after());
            let purged = enrichment.purge_expired();
            if purged > 0 {
                obs::emit_cache_purged(purged);
            }
        }
    })
}

pub struct HeraldBuilder {
    config: Arc<ConfigStore>,
    sessions: Arc<dyn SessionDirectory>,
    transport: Option<Arc<dyn WebhookTransport>>,
    catalog: Option<Arc<dyn SpriteCatalog>>,
    resolver: Arc<dyn WorldResolver>,
    housekeeping: Option<Duration>,
}

impl HeraldBuilder {
    pub fn transport(mut self, transport: Arc<dyn WebhookTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn SpriteCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn WorldResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Housekeeping interval. `None` leaves sweeping and cache purging to
    /// the caller.
    pub fn housekeeping(mut self, every: Option<Duration>) -> Self {
        self.housekeeping = every;
        self
    }

    /// Assemble the components and start housekeeping. Must run inside a
    /// tokio runtime, which hosts the I/O lane.
    pub fn build(self) -> Result<Herald, HeraldError> {
        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };
        let catalog = match self.catalog {
            Some(c) => c,
            None => Arc::new(PokeApiCatalog::new(
                &self.config.snapshot().catalog_base_url,
            )?),
        };

        let lane = Arc::new(IoLane::spawn());
        let broadcaster = Arc::new(LocalBroadcaster::new(
            Arc::clone(&self.config),
            self.sessions,
        ));
        let enrichment = Arc::new(EnrichmentCache::new(catalog));
        let dispatcher = Arc::new(WebhookDispatcher::new(
            Arc::clone(&self.config),
            Arc::clone(&lane),
            transport,
            Arc::clone(&enrichment),
            Arc::clone(&broadcaster),
        ));
        let correlator = Arc::new(SpawnCorrelator::new(
            Arc::clone(&self.config),
            self.resolver,
            Arc::clone(&broadcaster),
            Arc::clone(&dispatcher),
        ));

        let housekeeping = self
            .housekeeping
            .filter(|every| !every.is_zero())
            .map(|every| {
                spawn_housekeeping(
                    Arc::clone(&self.config),
                    Arc::clone(&correlator),
                    Arc::clone(&enrichment),
                    every,
                )
            });

        Ok(Herald {
            config: self.config,
            lane,
            broadcaster,
            enrichment,
            dispatcher,
            correlator,
            housekeeping: Mutex::new(housekeeping),
        })
    }
}
