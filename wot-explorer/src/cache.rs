//! Versioned local cache
//!
//! Two independent namespaces keyed by identity:
//! - profiles (24h TTL)
//! - trust facts, tagged with a format version; an older stored version
//!   purges the whole namespace on open
//!
//! The cache is an optimization only. Storage failures are logged and
//! swallowed, and every caller must work against an empty cache. Writers
//! sharing a storage merge on persist; the newer entry wins per identity.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use wot_core::{Profile, TrustConfig, TrustFact};

use crate::{ExplorerConfig, SharedStorage};

const PROFILES_KEY: &str = "wot:profiles";
const TRUST_KEY: &str = "wot:trust";
const TRUST_VERSION_KEY: &str = "wot:trust:version";

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A cached value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_valid(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.cached_at < ttl
    }
}

/// One keyed namespace persisted as a single storage value
struct Namespace<T> {
    key: &'static str,
    ttl: chrono::Duration,
    entries: DashMap<String, CacheEntry<T>>,
    /// Stored contents are stale and must be overwritten, not merged
    discard_stored: AtomicBool,
}

impl<T> Namespace<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    fn empty(key: &'static str, ttl: chrono::Duration) -> Self {
        Self {
            key,
            ttl,
            entries: DashMap::new(),
            discard_stored: AtomicBool::new(true),
        }
    }

    fn load(key: &'static str, ttl: chrono::Duration, storage: &SharedStorage) -> Self {
        let namespace = Self {
            discard_stored: AtomicBool::new(false),
            ..Self::empty(key, ttl)
        };
        if let Some(map) = Self::read_stored(key, storage) {
            for (id, entry) in map {
                namespace.entries.insert(id, entry);
            }
        }
        namespace
    }

    fn read_stored(key: &str, storage: &SharedStorage) -> Option<HashMap<String, CacheEntry<T>>> {
        match storage.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!("Discarding unreadable cache namespace {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache namespace {} unavailable: {}", key, e);
                None
            }
        }
    }

    fn get(&self, id: &str, now: DateTime<Utc>) -> Option<T> {
        self.entries
            .get(id)
            .filter(|e| e.is_valid(now, self.ttl))
            .map(|e| e.value.clone())
    }

    fn put_many(&self, items: impl IntoIterator<Item = (String, T)>, now: DateTime<Utc>) {
        for (id, value) in items {
            self.entries.insert(
                id,
                CacheEntry {
                    value,
                    cached_at: now,
                },
            );
        }
    }

    /// Write the namespace, keeping newer entries other writers stored
    fn persist(&self, storage: &SharedStorage, now: DateTime<Utc>) {
        let mut snapshot = if self.discard_stored.load(Ordering::Acquire) {
            HashMap::new()
        } else {
            Self::read_stored(self.key, storage).unwrap_or_default()
        };
        snapshot.retain(|_, e| e.is_valid(now, self.ttl));

        for entry in self.entries.iter() {
            let newer_stored = snapshot
                .get(entry.key())
                .is_some_and(|stored| stored.cached_at > entry.value().cached_at);
            if !newer_stored {
                snapshot.insert(entry.key().clone(), entry.value().clone());
            }
        }

        let raw = match serde_json::to_string(&snapshot) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache namespace {}: {}", self.key, e);
                return;
            }
        };
        match storage.set(self.key, &raw) {
            Ok(()) => self.discard_stored.store(false, Ordering::Release),
            Err(e) => debug!("Cache write for {} failed: {}", self.key, e),
        }
    }

    /// Forget expired entries
    fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_valid(now, self.ttl));
        before - self.entries.len()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub profiles: usize,
    pub trust_facts: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Profile and trust-fact cache
pub struct Cache {
    storage: SharedStorage,
    clock: Arc<dyn Clock>,
    trust_config: TrustConfig,
    profiles: Namespace<Profile>,
    trust: Namespace<TrustFact>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Cache {
    /// Open the cache, migrating the trust namespace if its format is older
    pub fn open(storage: SharedStorage, config: &ExplorerConfig) -> Self {
        Self::open_with_clock(storage, config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        storage: SharedStorage,
        config: &ExplorerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let migrated = migrate_trust_namespace(&storage, config.trust_format_version);

        let profiles = Namespace::load(PROFILES_KEY, config.profile_ttl(), &storage);
        let trust: Namespace<TrustFact> = if migrated {
            Namespace::empty(TRUST_KEY, config.trust_ttl())
        } else {
            Namespace::load(TRUST_KEY, config.trust_ttl(), &storage)
        };
        for mut entry in trust.entries.iter_mut() {
            entry.value.rescore(&config.trust);
        }

        Self {
            storage,
            clock,
            trust_config: config.trust.clone(),
            profiles,
            trust,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn record(&self, hits: usize, misses: usize) {
        self.hits.fetch_add(hits as u64, Ordering::Relaxed);
        self.misses.fetch_add(misses as u64, Ordering::Relaxed);
    }

    pub fn get_profile(&self, id: &str) -> Option<Profile> {
        let found = self.profiles.get(id, self.clock.now());
        self.record(found.is_some() as usize, found.is_none() as usize);
        found
    }

    /// Valid cached profiles among `ids`
    pub fn get_profiles(&self, ids: &[String]) -> HashMap<String, Profile> {
        let now = self.clock.now();
        let found: HashMap<String, Profile> = ids
            .iter()
            .filter_map(|id| self.profiles.get(id, now).map(|p| (id.clone(), p)))
            .collect();
        self.record(found.len(), ids.len() - found.len());
        found
    }

    /// Ids without a valid cached profile
    pub fn missing_profiles(&self, ids: &[String]) -> Vec<String> {
        let now = self.clock.now();
        ids.iter()
            .filter(|id| self.profiles.get(id, now).is_none())
            .cloned()
            .collect()
    }

    pub fn put_profiles(&self, profiles: Vec<Profile>) {
        if profiles.is_empty() {
            return;
        }
        let now = self.clock.now();
        self.profiles
            .put_many(profiles.into_iter().map(|p| (p.pubkey.clone(), p)), now);
        self.profiles.persist(&self.storage, now);
    }

    pub fn get_trust(&self, id: &str) -> Option<TrustFact> {
        let found = self.trust.get(id, self.clock.now());
        self.record(found.is_some() as usize, found.is_none() as usize);
        found
    }

    /// Valid cached trust facts among `ids`
    pub fn get_trust_many(&self, ids: &[String]) -> HashMap<String, TrustFact> {
        let now = self.clock.now();
        let found: HashMap<String, TrustFact> = ids
            .iter()
            .filter_map(|id| self.trust.get(id, now).map(|f| (id.clone(), f)))
            .collect();
        self.record(found.len(), ids.len() - found.len());
        found
    }

    /// Ids without a valid cached trust fact
    pub fn missing_trust(&self, ids: &[String]) -> Vec<String> {
        let now = self.clock.now();
        ids.iter()
            .filter(|id| self.trust.get(id, now).is_none())
            .cloned()
            .collect()
    }

    pub fn put_trust(&self, facts: HashMap<String, TrustFact>) {
        if facts.is_empty() {
            return;
        }
        let now = self.clock.now();
        let rescored = facts.into_iter().map(|(id, mut fact)| {
            fact.rescore(&self.trust_config);
            (id, fact)
        });
        self.trust.put_many(rescored, now);
        self.trust.persist(&self.storage, now);
    }

    /// Drop expired entries from both namespaces
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let removed = self.profiles.prune(now) + self.trust.prune(now);
        if removed > 0 {
            self.profiles.persist(&self.storage, now);
            self.trust.persist(&self.storage, now);
        }
        removed
    }

    /// Empty both namespaces
    pub fn purge(&self) {
        self.profiles.entries.clear();
        self.trust.entries.clear();
        for key in [PROFILES_KEY, TRUST_KEY] {
            if let Err(e) = self.storage.remove(key) {
                debug!("Cache purge of {} failed: {}", key, e);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            profiles: self.profiles.entries.len(),
            trust_facts: self.trust.entries.len(),
            hits,
            misses,
            hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
        }
    }
}

/// Purge stored trust facts written by an older format.
///
/// Returns whether a migration ran; the caller must then start the trust
/// namespace empty even if the purge itself failed.
fn migrate_trust_namespace(storage: &SharedStorage, current: u32) -> bool {
    let stored = match storage.get(TRUST_VERSION_KEY) {
        Ok(raw) => raw.and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0),
        Err(e) => {
            warn!("Cannot read trust cache version: {}", e);
            return false;
        }
    };

    if stored >= current {
        return false;
    }

    info!(
        "Trust cache format {} is older than {}, purging",
        stored, current
    );
    if let Err(e) = storage.remove(TRUST_KEY) {
        warn!("Trust cache purge failed: {}", e);
    }
    if let Err(e) = storage.set(TRUST_VERSION_KEY, &current.to_string()) {
        debug!("Trust cache version write failed: {}", e);
    }
    true
}
