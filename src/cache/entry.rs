use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use http::Method;
use time::OffsetDateTime;

use crate::net::{Request, Response};

/// Cache key: request method plus URL, query included and fragment excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    pub fn for_request(request: &Request) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        Self {
            method: request.method.clone(),
            url: url.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// When an entry stops being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    At(OffsetDateTime),
    /// Cacheable, but the lifetime does not fit a timestamp.
    Never,
}

impl Expiry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        match self {
            Expiry::At(at) => *at <= now,
            Expiry::Never => false,
        }
    }
}

/// A stored response. The entry owns the response, including its release hook.
pub struct CacheEntry {
    pub(crate) key: CacheKey,
    pub(crate) response: Response,
    pub(crate) inserted_at: OffsetDateTime,
    /// Fixed at insertion; hits never move it.
    pub(crate) expires_at: Expiry,
    pub(crate) size: usize,
    /// Logical clock value of the last insertion or hit, for LRU eviction.
    pub(crate) last_access: AtomicU64,
}

impl CacheEntry {
    pub(crate) fn new(key: CacheKey, response: Response, inserted_at: OffsetDateTime, expires_at: Expiry, tick: u64) -> Self {
        let size = estimate_size(&response);
        Self {
            key,
            response,
            inserted_at,
            expires_at,
            size,
            last_access: AtomicU64::new(tick),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn inserted_at(&self) -> OffsetDateTime {
        self.inserted_at
    }

    pub fn expires_at(&self) -> Expiry {
        self.expires_at
    }

    /// Rough memory footprint in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn touch(&self, tick: u64) {
        self.last_access.store(tick, Ordering::Relaxed);
    }

    pub(crate) fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Frees the stored response's resources. Safe to call more than once.
    pub(crate) fn release(&mut self) {
        self.response.release();
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("inserted_at", &self.inserted_at)
            .field("expires_at", &self.expires_at)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

fn estimate_size(response: &Response) -> usize {
    let headers: usize = response
        .headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum();
    response.body.len() + headers + response.url.as_str().len()
}
