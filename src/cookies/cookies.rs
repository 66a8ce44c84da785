//! Cookie core types.
//!
//! # Concurrency model
//! [`CookieJarHandle`] is `Arc<RwLock<dyn CookieJar + Send + Sync>>`. Callers
//! take a **read lock** for queries (`header_for`, `get`) and a **write lock**
//! for anything that changes the jar (`merge`, `clear_expired`, ...).
//!
//! ```ignore
//! let jar = session.cookie_jar(); // -> CookieJarHandle
//! let header = jar.read().header_for(&url, true);
//! jar.write().store_response_cookies(&url, &headers);
//! ```
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::cookies::CookieJar;

/// A handle to a cookie jar trait object.
pub type CookieJarHandle = Arc<RwLock<dyn CookieJar + Send + Sync>>;

/// Where a cookie mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieSource {
    /// A `Set-Cookie` response header.
    Http,
    /// `document.cookie = "..."` from a script running on the page.
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// A stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Value exactly as received, surrounding quotes included when the server sent them.
    pub value: String,

    /// Canonical domain. `.example.com` for cookies set with a `Domain`
    /// attribute, the bare request host for host-only cookies, and the bare
    /// label for single-label domains such as `localhost`.
    pub domain: String,

    pub path: String,

    /// Expiration instant. Session cookies have `None`.
    #[serde(with = "time::serde::timestamp::option")]
    pub expires: Option<OffsetDateTime>,

    /// Only sent over secure channels.
    pub secure: bool,

    /// Hidden from `document.cookie`.
    pub http_only: bool,

    /// Set without a `Domain` attribute.
    pub host_only: bool,

    pub version: Option<u32>,

    pub same_site: Option<SameSite>,

    /// Insertion order, used to break path-length ties.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl Cookie {
    /// Identity of a cookie inside a jar: setting a cookie with the same key replaces the old one.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.name, &self.domain, &self.path)
    }

    pub fn is_session(&self) -> bool {
        self.expires.is_none()
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    /// Whether the cookie applies to `host` (already lowercased).
    ///
    /// Dotted domains match the domain itself and every subdomain on a label
    /// boundary; anything else has to be equal.
    pub fn domain_matches(&self, host: &str) -> bool {
        match self.domain.strip_prefix('.') {
            Some(bare) => host == bare || host.ends_with(&self.domain),
            None => host == self.domain,
        }
    }

    /// Whether the cookie applies to `request_path`. `/foo` matches `/foo`
    /// and `/foo/bar` but not `/foobar`.
    pub fn path_matches(&self, request_path: &str) -> bool {
        let path = self.path.trim_end_matches('/');
        if path.is_empty() {
            return true;
        }
        match request_path.strip_prefix(path) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// `name=value` as sent in a `Cookie` header.
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}
