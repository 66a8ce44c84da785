//! Cacheability and freshness.
//!
//! The `Cache-Control` header is tokenized once into a list of typed
//! [`Directive`]s; the freshness decision then works on those instead of
//! searching the raw header text.
//!
//! Decision order for a response:
//! 1. `no-store` or `no-cache` → not cacheable.
//! 2. `s-maxage=N` (preferred) or `max-age=N` → TTL of N seconds.
//! 3. `Expires` → TTL until that date. An unparseable or past date (this
//!    includes the common `0` and `-1` sentinels) makes the response not
//!    cacheable, whatever else it carries.
//! 4. `Last-Modified` alone → heuristic freshness: the content must be older
//!    than [`HEURISTIC_WINDOW`]; the TTL is a tenth of its age, capped at
//!    [`MAX_HEURISTIC_TTL`].
//! 5. Nothing of the above → not cacheable.
//!
//! When `Last-Modified` is present next to an explicit lifetime (2 or 3), the
//! explicit TTL must be strictly greater than the response's age, counted up to
//! [`HEURISTIC_WINDOW`]. This rejects near-term `Expires` dates stamped onto
//! content that was just modified.
use std::fmt;

use http::header::{CACHE_CONTROL, EXPIRES, LAST_MODIFIED};
use http::HeaderMap;
use time::{Duration, OffsetDateTime};

use crate::net::http_date::parse_http_date;

/// Content modified more recently than this is not heuristically cacheable.
pub const HEURISTIC_WINDOW: Duration = Duration::minutes(10);

/// Upper bound for heuristic lifetimes.
pub const MAX_HEURISTIC_TTL: Duration = Duration::hours(24);

/// A single `Cache-Control` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    NoStore,
    NoCache,
    Private,
    Public,
    MaxAge(i64),
    SMaxAge(i64),
    /// Anything else, including directives with malformed arguments.
    Other(String),
}

/// Tokenized `Cache-Control` header(s).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: Vec<Directive>,
}

impl CacheControl {
    /// Tokenizes every `Cache-Control` header in `headers`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let directives = headers
            .get_all(CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(parse_directive)
            .collect();

        Self { directives }
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn no_store(&self) -> bool {
        self.directives.contains(&Directive::NoStore)
    }

    pub fn no_cache(&self) -> bool {
        self.directives.contains(&Directive::NoCache)
    }

    pub fn max_age(&self) -> Option<i64> {
        self.directives.iter().find_map(|d| match d {
            Directive::MaxAge(n) => Some(*n),
            _ => None,
        })
    }

    pub fn s_maxage(&self) -> Option<i64> {
        self.directives.iter().find_map(|d| match d {
            Directive::SMaxAge(n) => Some(*n),
            _ => None,
        })
    }
}

fn parse_directive(token: &str) -> Directive {
    let (name, arg) = match token.split_once('=') {
        Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
        None => (token, None),
    };

    let seconds = || arg.and_then(|a| a.parse::<i64>().ok()).map(|n| n.max(0));

    match name.to_ascii_lowercase().as_str() {
        "no-store" => Directive::NoStore,
        "no-cache" => Directive::NoCache,
        "private" => Directive::Private,
        "public" => Directive::Public,
        "max-age" => seconds().map_or_else(|| Directive::Other(token.to_string()), Directive::MaxAge),
        "s-maxage" => seconds().map_or_else(|| Directive::Other(token.to_string()), Directive::SMaxAge),
        _ => Directive::Other(token.to_string()),
    }
}

/// Why a response was refused by the cache. Not an error, just the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uncacheable {
    NoStore,
    NoCache,
    /// `Expires` could not be parsed.
    InvalidExpires,
    /// The explicit lifetime is already over.
    Expired,
    /// The explicit lifetime does not outlast the age of the content.
    LifetimeTooShort,
    /// `Last-Modified` is too recent for heuristic freshness.
    RecentlyModified,
    /// No freshness information at all.
    NoFreshnessInfo,
}

impl fmt::Display for Uncacheable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Uncacheable::NoStore => "no-store",
            Uncacheable::NoCache => "no-cache",
            Uncacheable::InvalidExpires => "unparseable Expires",
            Uncacheable::Expired => "already expired",
            Uncacheable::LifetimeTooShort => "lifetime shorter than content age",
            Uncacheable::RecentlyModified => "recently modified",
            Uncacheable::NoFreshnessInfo => "no freshness information",
        };
        f.write_str(reason)
    }
}

/// Computes how long a response with `headers` may be served from cache.
pub fn time_to_live(headers: &HeaderMap, now: OffsetDateTime) -> Result<Duration, Uncacheable> {
    let cc = CacheControl::from_headers(headers);
    if cc.no_store() {
        return Err(Uncacheable::NoStore);
    }
    if cc.no_cache() {
        return Err(Uncacheable::NoCache);
    }

    let age = header_str(headers, LAST_MODIFIED)
        .and_then(parse_http_date)
        .map(|lm| (now - lm).max(Duration::ZERO));

    let explicit = if let Some(secs) = cc.s_maxage().or_else(|| cc.max_age()) {
        Some(Duration::seconds(secs))
    } else if let Some(expires) = header_str(headers, EXPIRES) {
        let expires = parse_http_date(expires).ok_or(Uncacheable::InvalidExpires)?;
        Some(expires - now)
    } else {
        None
    };

    match (explicit, age) {
        (Some(ttl), _) if ttl <= Duration::ZERO => Err(Uncacheable::Expired),
        (Some(ttl), Some(age)) if ttl <= age.min(HEURISTIC_WINDOW) => Err(Uncacheable::LifetimeTooShort),
        (Some(ttl), _) => Ok(ttl),
        (None, Some(age)) if age > HEURISTIC_WINDOW => Ok((age / 10_i32).min(MAX_HEURISTIC_TTL)),
        (None, Some(_)) => Err(Uncacheable::RecentlyModified),
        (None, None) => Err(Uncacheable::NoFreshnessInfo),
    }
}

/// Shorthand for `time_to_live(..).is_ok()`.
pub fn is_cacheable(headers: &HeaderMap, now: OffsetDateTime) -> bool {
    time_to_live(headers, now).is_ok()
}

fn header_str(headers: &HeaderMap, name: http::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
