//! TTL cache implementation using the dashmap crate.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::debug;

use docrepo_core::config::cache::CacheConfig;
use docrepo_core::traits::clock::{Clock, SystemClock};

/// A cached value and the instant after which it must not be served.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Concurrent TTL cache with a bound on entry count.
///
/// Expired entries are evicted lazily when read. When an insert pushes the
/// entry count over the bound, expired entries are purged first and then
/// the entries with the soonest expiry are evicted.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    /// Live entries.
    entries: DashMap<K, CacheEntry<V>>,
    /// Lifetime of every entry.
    ttl: TimeDelta,
    /// Maximum number of entries.
    max_entries: usize,
    /// Whether the cache stores anything.
    enabled: bool,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
    /// Serializes capacity eviction so concurrent inserts do not over-evict.
    eviction: Mutex<()>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache from configuration.
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl_seconds = i64::try_from(config.ttl_seconds).unwrap_or(i64::MAX);
        Self::with_ttl(
            TimeDelta::try_seconds(ttl_seconds).unwrap_or(TimeDelta::MAX),
            config.max_entries,
            config.enabled,
            clock,
        )
    }

    /// Create a cache with explicit parameters.
    pub fn with_ttl(ttl: TimeDelta, max_entries: usize, enabled: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            enabled,
            clock,
            eviction: Mutex::new(()),
        }
    }

    /// Create a cache that never stores anything.
    pub fn disabled() -> Self {
        Self::with_ttl(TimeDelta::zero(), 1, false, Arc::new(SystemClock))
    }

    /// Whether the cache stores anything.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Lifetime of every entry.
    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Return a live value, evicting it if it has expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.enabled {
            return None;
        }
        let now = self.clock.now();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if now <= entry.expires_at => return Some(entry.value.clone()),
            Some(_) => {}
        }
        self.entries.remove_if(key, |_, entry| now > entry.expires_at);
        None
    }

    /// Whether a live value exists, evicting it if it has expired.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Store a value, stamping its expiry at `now + ttl`.
    pub fn set(&self, key: K, value: V) {
        if !self.enabled {
            return;
        }
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(key, CacheEntry { value, expires_at });
        if self.entries.len() > self.max_entries {
            self.enforce_capacity();
        }
    }

    /// Remove a value. Returns `true` if it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    /// Remove several values.
    pub fn delete_many<'a, Q, I>(&self, keys: I)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        for key in keys {
            self.entries.remove(key);
        }
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enforce_capacity(&self) {
        let _guard = self.eviction.lock().unwrap_or_else(PoisonError::into_inner);
        let purged = self.purge_expired();
        let mut evicted = 0usize;
        while self.entries.len() > self.max_entries {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());
            match soonest {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        debug!(purged, evicted, max_entries = self.max_entries, "Cache capacity enforced");
    }
}
