//! Sprite enrichment: resolving a display image URL for a species.
//!
//! Lookups go through [`EnrichmentCache`], which keeps results (including
//! "not found") for a fixed TTL. Misses fall back from the plain species
//! entry to the species' default variety, since forms are indexed under
//! variety-specific keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::CatalogError;
use crate::obs;

/// How long a cached lookup stays valid.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout applied to every outbound HTTP request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(8);

pub const USER_AGENT: &str = concat!("spawn-herald/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artwork {
    pub front_default: Option<String>,
    pub front_shiny: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherSprites {
    #[serde(rename = "official-artwork")]
    pub official_artwork: Option<Artwork>,
}

/// Sprite URLs published for one catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteSet {
    pub front_default: Option<String>,
    pub front_female: Option<String>,
    pub front_shiny: Option<String>,
    pub front_shiny_female: Option<String>,
    pub other: Option<OtherSprites>,
}

impl SpriteSet {
    /// Best image for the requested variant, preferring official artwork.
    pub fn pick(&self, variant: bool) -> Option<String> {
        let artwork = self.other.as_ref().and_then(|o| o.official_artwork.as_ref());
        if variant {
            artwork
                .and_then(|a| a.front_shiny.clone())
                .or_else(|| self.front_shiny.clone())
                .or_else(|| self.front_shiny_female.clone())
        } else {
            artwork
                .and_then(|a| a.front_default.clone())
                .or_else(|| self.front_default.clone())
                .or_else(|| self.front_female.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub name: String,
}

/// One variety listed under a species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variety {
    #[serde(default)]
    pub is_default: bool,
    pub pokemon: NamedResource,
}

impl Variety {
    pub fn new(name: &str, is_default: bool) -> Self {
        Self {
            is_default,
            pokemon: NamedResource {
                name: name.to_string(),
            },
        }
    }
}

/// External catalog the sprites are resolved against.
#[async_trait]
pub trait SpriteCatalog: Send + Sync {
    /// Sprite set for an entry key. `CatalogError::NotFound` on a miss.
    async fn sprites(&self, key: &str) -> Result<SpriteSet, CatalogError>;

    /// Varieties listed for a species key. `CatalogError::NotFound` on a miss.
    async fn varieties(&self, key: &str) -> Result<Vec<Variety>, CatalogError>;
}

#[derive(Deserialize)]
struct PokemonDoc {
    sprites: Option<SpriteSet>,
}

#[derive(Deserialize)]
struct SpeciesDoc {
    #[serde(default)]
    varieties: Vec<Variety>,
}

/// HTTP catalog speaking the PokeAPI v2 layout.
pub struct PokeApiCatalog {
    base_url: String,
    client: reqwest::Client,
}

impl PokeApiCatalog {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
    ) -> Result<T, CatalogError> {
        let url = format!("{}/{}/{}", self.base_url, path, key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SpriteCatalog for PokeApiCatalog {
    async fn sprites(&self, key: &str) -> Result<SpriteSet, CatalogError> {
        let doc: PokemonDoc = self.get_json("pokemon", key).await?;
        Ok(doc.sprites.unwrap_or_default())
    }

    async fn varieties(&self, key: &str) -> Result<Vec<Variety>, CatalogError> {
        let doc: SpeciesDoc = self.get_json("pokemon-species", key).await?;
        Ok(doc.varieties)
    }
}

/// Normalize a species name into a catalog key.
///
/// `"Mr. Mime"` -> `"mr-mime"`, `"Nidoran♀"` -> `"nidoran-f"`,
/// `"Farfetch'd"` -> `"farfetchd"`, `"Flabébé"` -> `"flabebe"`.
pub fn normalize_catalog_key(name: &str) -> String {
    let mut raw = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        match c {
            ' ' | ':' | '_' => raw.push('-'),
            '♀' => raw.push_str("-f"),
            '♂' => raw.push_str("-m"),
            'é' | 'è' | 'ê' | 'ë' => raw.push('e'),
            c if c.is_ascii_alphanumeric() || c == '-' => raw.push(c),
            _ => {}
        }
    }

    let mut key = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '-' && (key.is_empty() || key.ends_with('-')) {
            continue;
        }
        key.push(c);
    }
    while key.ends_with('-') {
        key.pop();
    }
    key
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` is the cached "not found" result
    url: Option<String>,
    expires_at: Instant,
}

/// TTL cache in front of a [`SpriteCatalog`].
pub struct EnrichmentCache {
    catalog: Arc<dyn SpriteCatalog>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl EnrichmentCache {
    pub fn new(catalog: Arc<dyn SpriteCatalog>) -> Self {
        Self::with_ttl(catalog, CACHE_TTL)
    }

    pub fn with_ttl(catalog: Arc<dyn SpriteCatalog>, ttl: Duration) -> Self {
        Self {
            catalog,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the image URL for `species`, or `None` if there is none.
    ///
    /// Hits and misses are cached for the TTL. Network and parse failures
    /// are logged and left uncached so the next call retries.
    pub async fn lookup(&self, species: &str, variant: bool) -> Option<String> {
        let key = normalize_catalog_key(species);
        if key.is_empty() {
            return None;
        }
        let cache_key = format!("{}|{}", key, if variant { "shiny" } else { "default" });

        if let Some(hit) = self.cached(&cache_key) {
            return hit;
        }

        match self.fetch(&key, variant).await {
            Ok(url) => {
                if url.is_none() {
                    obs::emit_lookup_miss(&cache_key);
                }
                self.store(cache_key, url.clone());
                url
            }
            Err(e) => {
                obs::emit_lookup_failed(&cache_key, &e);
                None
            }
        }
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    fn cached(&self, cache_key: &str) -> Option<Option<String>> {
        let entries = self.lock();
        entries
            .get(cache_key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.url.clone())
    }

    fn store(&self, cache_key: String, url: Option<String>) {
        let entry = CacheEntry {
            url,
            expires_at: Instant::now() + self.ttl,
        };
        self.lock().insert(cache_key, entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn fetch(&self, key: &str, variant: bool) -> Result<Option<String>, CatalogError> {
        match self.catalog.sprites(key).await {
            Ok(set) => Ok(set.pick(variant)),
            Err(e) if e.is_not_found() => self.fetch_default_variety(key, variant).await,
            Err(e) => Err(e),
        }
    }

    async fn fetch_default_variety(
        &self,
        key: &str,
        variant: bool,
    ) -> Result<Option<String>, CatalogError> {
        let varieties = match self.catalog.varieties(key).await {
            Ok(v) => v,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(chosen) = varieties
            .iter()
            .find(|v| v.is_default)
            .or_else(|| varieties.first())
        else {
            return Ok(None);
        };

        let sub_key = normalize_catalog_key(&chosen.pokemon.name);
        match self.catalog.sprites(&sub_key).await {
            Ok(set) => Ok(set.pick(variant)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
