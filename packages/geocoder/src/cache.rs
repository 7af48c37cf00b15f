//! Bounded, time-limited geocode cache.
//!
//! Keyed by [`normalize_place_name`](crate::normalize_place_name) so that
//! `"JFK Airport"` and `" jfk  airport"` share an entry. Only successful
//! resolutions are stored. When full, the least recently used entry is
//! evicted; entries older than the TTL are dropped when read.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::GeocodedPlace;

struct CacheEntry {
    place: GeocodedPlace,
    inserted_at: Instant,
}

/// In-memory geocode cache shared by all requests.
pub struct GeocodeCache {
    ttl: Duration,
    entries: Option<Mutex<LruCache<String, CacheEntry>>>,
}

impl GeocodeCache {
    /// Creates a cache holding at most `capacity` entries for `ttl` each.
    /// A capacity of `0` disables caching.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().map_or(0, |entries| entries.cap().get())
    }

    /// Number of entries currently stored (including expired ones that
    /// have not been read since they expired).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |entries| entries.len())
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached place for `key`, if present and fresh.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<GeocodedPlace> {
        self.get_at(key, Instant::now())
    }

    /// Stores `place` under `key`.
    pub fn insert(&self, key: String, place: GeocodedPlace) {
        self.insert_at(key, place, Instant::now());
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<GeocodedPlace> {
        let mut entries = self.lock()?;
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.inserted_at) < self.ttl {
            return Some(entry.place.clone());
        }
        entries.pop(key);
        None
    }

    fn insert_at(&self, key: String, place: GeocodedPlace, now: Instant) {
        if let Some(mut entries) = self.lock() {
            entries.put(
                key,
                CacheEntry {
                    place,
                    inserted_at: now,
                },
            );
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, CacheEntry>>> {
        self.entries
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
