//! # Render Cache
//!
//! Repeated renders of the same overlay with the same values are served from
//! an in-process cache instead of running the builder again.
//!
//! ## Key Components
//!
//! - **[`Cache`]**: the narrow `get`/`set` contract the renderer depends on.
//!   Stored and returned document lists are always independent copies.
//! - **[`MemoryCache`]**: the default implementation, a mutex-guarded map with
//!   per-entry expiry. Expired entries are dropped when `get` finds them and
//!   swept on every `set`, so the map only holds live renders.
//! - **[`KeyFn`]**: derives the cache key from a [`CacheSpec`].
//!   [`default_key`] hashes path and values; [`path_only_key`] ignores values.
//! - **[`CacheOptions`]**: TTL, key function and an optional custom cache.
//!
//! A cache never fails a render: a poisoned lock degrades to a miss on `get`
//! and to a skipped store on `set`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::defaults::DEFAULT_CACHE_TTL;
use crate::document::Document;
use crate::error::Result;

/// What a cache key is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSpec {
    pub path: String,
    pub values: BTreeMap<String, String>,
}

impl CacheSpec {
    pub fn new(path: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            path: path.into(),
            values,
        }
    }
}

/// Derives a cache key from a render specification.
pub type KeyFn = Arc<dyn Fn(&CacheSpec) -> Result<String> + Send + Sync>;

/// SHA-256 (hex) of the canonical JSON encoding of path and sorted values.
pub fn default_key(spec: &CacheSpec) -> Result<String> {
    let encoded = serde_json::to_vec(spec)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// SHA-256 (hex) of the path alone. Renders that differ only in values share
/// an entry.
pub fn path_only_key(spec: &CacheSpec) -> Result<String> {
    let encoded = serde_json::to_vec(&spec.path)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// Key-value store for rendered document lists.
pub trait Cache: Send + Sync {
    /// A copy of the live entry for `key`, if any.
    fn get(&self, key: &str) -> Option<Vec<Document>>;

    /// Store a copy of `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: &[Document], ttl: Duration);
}

/// Time source for expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        match self.offset.lock() {
            Ok(mut offset) => *offset += by,
            Err(poisoned) => *poisoned.into_inner() += by,
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = match self.offset.lock() {
            Ok(offset) => *offset,
            Err(poisoned) => *poisoned.into_inner(),
        };
        self.start + offset
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<Document>,
    /// `None` when the TTL reaches past what an `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now <= at)
    }
}

/// In-process [`Cache`] with per-entry expiry.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Physically remove expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        match self.entries.lock() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, entry| entry.is_live(now));
                before - entries.len()
            }
            Err(_) => {
                warn!("render cache lock poisoned, skipping purge");
                0
            }
        }
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<Document>> {
        let now = self.clock.now();
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(_) => {
                warn!("render cache lock poisoned, treating {} as a miss", key);
                return None;
            }
        };
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        debug!("render cache entry {} expired", key);
        entries.remove(key);
        None
    }

    fn set(&self, key: &str, value: &[Document], ttl: Duration) {
        let now = self.clock.now();
        let expires_at = now.checked_add(ttl);
        if expires_at.is_none() {
            debug!("render cache TTL {:?} for {} never expires", ttl, key);
        }
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.retain(|_, entry| entry.is_live(now));
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.to_vec(),
                        expires_at,
                    },
                );
            }
            Err(_) => warn!("render cache lock poisoned, not storing {}", key),
        }
    }
}

/// Cache configuration for a renderer.
#[derive(Clone)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub key_fn: KeyFn,
    /// Use this cache instead of a fresh [`MemoryCache`].
    pub cache: Option<Arc<dyn Cache>>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            key_fn: Arc::new(default_key),
            cache: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&CacheSpec) -> Result<String> + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The configured cache, or a fresh in-memory one.
    pub fn build(&self) -> Arc<dyn Cache> {
        match &self.cache {
            Some(cache) => Arc::clone(cache),
            None => Arc::new(MemoryCache::new()),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("ttl", &self.ttl)
            .field("custom_cache", &self.cache.is_some())
            .finish()
    }
}
