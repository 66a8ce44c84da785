//! In-memory response cache.
//!
//! [`CacheStore`] holds at most `max_size` entries. Admission is decided by
//! [`policy::time_to_live`](crate::cache::policy::time_to_live); the TTL is
//! turned into an absolute expiry at insertion time and never recomputed.
//!
//! When the store is full, the least recently used entry is evicted (entries
//! that were never hit are ordered by insertion). Every entry that leaves the
//! store (eviction, replacement, expiry sweep, clear) has its response's
//! release hook run before the call that removed it returns.
//!
//! The store itself is not synchronized; share it through a
//! [`CacheHandle`](crate::cache::CacheHandle). Lookups only need the read
//! lock: hit bookkeeping uses atomics.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use http::Method;
use time::OffsetDateTime;

use crate::cache::entry::{CacheEntry, CacheKey, Expiry};
use crate::cache::policy;
use crate::net::{Request, Response};

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<CacheKey, CacheEntry>,
    max_size: usize,
    /// Logical clock for LRU ordering.
    clock: AtomicU64,
    counters: Counters,
}

impl CacheStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            clock: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Whether `response` would be admitted right now.
    pub fn is_cacheable(&self, response: &Response) -> bool {
        policy::is_cacheable(&response.headers, OffsetDateTime::now_utc())
    }

    /// Offers `response` (fetched for `request`) to the cache.
    ///
    /// When admitted, the cache keeps the original response together with its
    /// release hook and hands back a detached copy. Otherwise `response` comes
    /// back untouched and its owner stays responsible for it.
    pub fn store(&mut self, request: &Request, response: Response) -> Response {
        self.store_at(request, response, OffsetDateTime::now_utc())
    }

    pub fn store_at(&mut self, request: &Request, response: Response, now: OffsetDateTime) -> Response {
        if !is_cacheable_method(&request.method) || self.max_size == 0 {
            return response;
        }

        let key = CacheKey::for_request(request);
        let ttl = match policy::time_to_live(&response.headers, now) {
            Ok(ttl) => ttl,
            Err(reason) => {
                log::debug!("Not caching {key}: {reason}");
                return response;
            }
        };
        let expires_at = now.checked_add(ttl).map_or(Expiry::Never, Expiry::At);

        if let Some(mut previous) = self.entries.remove(&key) {
            previous.release();
        }
        while self.entries.len() >= self.max_size {
            self.evict_lru();
        }

        log::debug!("Caching {key} until {expires_at:?}");
        let detached = response.detached();
        let tick = self.tick();
        self.entries
            .insert(key.clone(), CacheEntry::new(key, response, now, expires_at, tick));
        detached
    }

    /// Returns a copy of the cached response for `request` if it is still fresh.
    pub fn lookup(&self, request: &Request) -> Option<Response> {
        self.lookup_at(request, OffsetDateTime::now_utc())
    }

    pub fn lookup_at(&self, request: &Request, now: OffsetDateTime) -> Option<Response> {
        if !is_cacheable_method(&request.method) {
            return None;
        }

        let key = CacheKey::for_request(request);
        match self.entries.get(&key) {
            Some(entry) if !entry.expires_at.is_expired(now) => {
                entry.touch(self.tick());
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("Cache hit for {key}");
                Some(entry.response.detached())
            }
            _ => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether a fresh or stale entry exists for `request`.
    pub fn contains(&self, request: &Request) -> bool {
        self.entries.contains_key(&CacheKey::for_request(request))
    }

    /// Removes and releases every entry whose expiry has passed. Returns how many were removed.
    pub fn clear_outdated(&mut self) -> usize {
        self.clear_outdated_at(OffsetDateTime::now_utc())
    }

    pub fn clear_outdated_at(&mut self, now: OffsetDateTime) -> usize {
        let outdated: Vec<CacheKey> = self
            .entries
            .values()
            .filter(|e| e.expires_at.is_expired(now))
            .map(|e| e.key.clone())
            .collect();

        for key in &outdated {
            if let Some(mut entry) = self.entries.remove(key) {
                log::debug!("Expired {key}");
                entry.release();
            }
        }
        outdated.len()
    }

    /// Removes and releases all entries.
    pub fn clear(&mut self) {
        for (_, mut entry) in self.entries.drain() {
            entry.release();
        }
    }

    /// Changes the capacity, evicting least recently used entries if the store is now over it.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.entries.len() > self.max_size {
            self.evict_lru();
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of entries currently stored.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Summed size estimate of all entries, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.entries.values().map(CacheEntry::size).sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_lru(&mut self) {
        let Some(key) = self
            .entries
            .values()
            .min_by_key(|e| e.last_access())
            .map(|e| e.key.clone())
        else {
            return;
        };

        if let Some(mut entry) = self.entries.remove(&key) {
            log::debug!("Evicting {key}");
            entry.release();
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.clear();
    }
}

fn is_cacheable_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}
