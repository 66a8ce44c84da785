//! Cookie jar abstraction and the in-memory implementation.
//!
//! A **cookie jar** holds all cookies of one session. The session hands it
//! every `Set-Cookie` header it receives (and every `document.cookie`
//! assignment a script makes) and asks it for the `Cookie` header of every
//! outgoing request, hop by hop.
//!
//! The jar is **not** internally synchronized. Share it through a
//! [`CookieJarHandle`](crate::cookies::CookieJarHandle).
use std::net::IpAddr;

use http::header::SET_COOKIE;
use http::HeaderMap;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::cookies::parser::{parse_set_cookie, SetCookie};
use crate::cookies::{Cookie, CookieSource};

/// The cookies of one session.
///
/// Every method that depends on the clock has an `_at` variant taking `now`
/// explicitly; the plain variant uses the current time.
pub trait CookieJar: Send + Sync {
    /// Merges `set_cookies` (raw `Set-Cookie` values) received for `url`.
    ///
    /// Cookies already expired at `now` are dropped first. Invalid or
    /// rejected cookies are skipped individually. A cookie whose
    /// expiry is already over removes the stored cookie with the same
    /// (name, domain, path) key. Ignored while the jar is disabled.
    fn merge_at(&mut self, url: &Url, set_cookies: &[&str], source: CookieSource, now: OffsetDateTime);

    fn merge(&mut self, url: &Url, set_cookies: &[&str], source: CookieSource) {
        self.merge_at(url, set_cookies, source, OffsetDateTime::now_utc());
    }

    /// Stores cookies found in the `Set-Cookie` response `headers` for `url`.
    fn store_response_cookies(&mut self, url: &Url, headers: &HeaderMap) {
        let values: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !values.is_empty() {
            self.merge(url, &values, CookieSource::Http);
        }
    }

    /// Returns the `Cookie` header value for a request to `url`, or `None` to omit the header.
    ///
    /// `secure` tells whether the request goes over a secure channel.
    fn header_for_at(&self, url: &Url, secure: bool, now: OffsetDateTime) -> Option<String>;

    fn header_for(&self, url: &Url, secure: bool) -> Option<String> {
        self.header_for_at(url, secure, OffsetDateTime::now_utc())
    }

    /// [`header_for`](Self::header_for) with the security derived from the URL scheme.
    fn get_request_cookies(&self, url: &Url) -> Option<String> {
        self.header_for(url, matches!(url.scheme(), "https" | "wss"))
    }

    /// What `document.cookie` reads on a page at `url`: like the request
    /// header, minus `HttpOnly` cookies. Empty when nothing matches.
    fn script_cookies_at(&self, url: &Url, now: OffsetDateTime) -> String;

    fn script_cookies(&self, url: &Url) -> String {
        self.script_cookies_at(url, OffsetDateTime::now_utc())
    }

    /// First cookie called `name` that is still alive at `now`. `None` while the jar is disabled.
    fn get_at(&self, name: &str, now: OffsetDateTime) -> Option<Cookie>;

    fn get(&self, name: &str) -> Option<Cookie> {
        self.get_at(name, OffsetDateTime::now_utc())
    }

    /// All cookies alive at `now`, in insertion order. Empty while the jar is disabled.
    fn get_all_at(&self, now: OffsetDateTime) -> Vec<Cookie>;

    fn get_all(&self) -> Vec<Cookie> {
        self.get_all_at(OffsetDateTime::now_utc())
    }

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Removes every cookie expired at `now`. Returns how many were removed.
    fn clear_expired(&mut self, now: OffsetDateTime) -> usize;

    /// Removes all cookies.
    fn clear(&mut self);

    /// Removes the cookie with the given key. Returns whether one was removed.
    fn remove(&mut self, name: &str, domain: &str, path: &str) -> bool;
}

/// In-memory cookie jar.
///
/// Cookies live in one vector in insertion order. Replacing a cookie removes
/// the old record and appends the new one, so a replaced cookie loses its
/// position among cookies with equal path length.
#[derive(Debug, Clone)]
pub struct DefaultCookieJar {
    cookies: Vec<Cookie>,
    enabled: bool,
    next_seq: u64,
}

impl Default for DefaultCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultCookieJar {
    /// Creates an empty, enabled cookie jar.
    pub fn new() -> Self {
        DefaultCookieJar {
            cookies: Vec::new(),
            enabled: true,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    fn merge_one(&mut self, url: &Url, header: &str, source: CookieSource, now: OffsetDateTime) {
        let Some(parsed) = parse_set_cookie(header) else {
            log::debug!("Ignoring malformed Set-Cookie for {url}: {header:?}");
            return;
        };

        let cookie = match self.build(url, &parsed, source, now) {
            Ok(cookie) => cookie,
            Err(reason) => {
                log::debug!("Rejected cookie {} for {url}: {reason}", parsed.name);
                return;
            }
        };

        let existing = self.cookies.iter().position(|c| c.key() == cookie.key());

        if source == CookieSource::Script && existing.is_some_and(|i| self.cookies[i].http_only) {
            log::debug!("Rejected cookie {} for {url}: script cannot overwrite HttpOnly cookie", cookie.name);
            return;
        }

        if let Some(index) = existing {
            self.cookies.remove(index);
        }

        if cookie.is_expired(now) {
            log::debug!("Deleted cookie {} ({}{})", cookie.name, cookie.domain, cookie.path);
            return;
        }

        self.cookies.push(cookie);
    }

    /// Turns a parsed header into a cookie, applying defaults and the acceptance rules.
    fn build(&mut self, url: &Url, parsed: &SetCookie, source: CookieSource, now: OffsetDateTime) -> Result<Cookie, &'static str> {
        let host = url.host_str().ok_or("URL has no host")?.to_ascii_lowercase();
        let host = host.trim_matches(|c| c == '[' || c == ']');

        let http_only = parsed.http_only();
        if http_only && source == CookieSource::Script {
            return Err("script cannot set HttpOnly cookies");
        }

        let secure = parsed.secure();
        if secure && !matches!(url.scheme(), "https" | "wss") {
            return Err("Secure cookie received over an insecure channel");
        }

        let (domain, host_only) = match parsed.domain() {
            Some(domain) => {
                if !domain_accepted(host, &domain) {
                    return Err("Domain does not match the request host");
                }
                if domain.contains('.') {
                    (format!(".{domain}"), false)
                } else {
                    (domain, false)
                }
            }
            None => (host.to_string(), true),
        };

        let path = parsed
            .path()
            .map(str::to_string)
            .unwrap_or_else(|| default_path(url));

        let expires = match (parsed.max_age(), parsed.expires()) {
            (Some(secs), _) if secs <= 0 => Some(OffsetDateTime::UNIX_EPOCH),
            (Some(secs), _) => Some(now.saturating_add(Duration::seconds(secs))),
            (None, Some(at)) => at,
            (None, None) => None,
        };

        let seq = self.next_seq;
        self.next_seq += 1;

        Ok(Cookie {
            name: parsed.name.clone(),
            value: parsed.value.clone(),
            domain,
            path,
            expires,
            secure,
            http_only,
            host_only,
            version: parsed.version(),
            same_site: parsed.same_site(),
            seq,
        })
    }

    /// Non-expired cookies applicable to `url`, most specific path first.
    fn matching(&self, url: &Url, secure: bool, now: OffsetDateTime) -> Vec<&Cookie> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };
        let host = host.to_ascii_lowercase();
        let host = host.trim_matches(|c| c == '[' || c == ']');
        let path = url.path();

        let mut matched: Vec<&Cookie> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now))
            .filter(|c| c.domain_matches(host))
            .filter(|c| c.path_matches(path))
            .filter(|c| !c.secure || secure)
            .collect();

        matched.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.seq.cmp(&b.seq)));
        matched
    }
}

impl CookieJar for DefaultCookieJar {
    fn merge_at(&mut self, url: &Url, set_cookies: &[&str], source: CookieSource, now: OffsetDateTime) {
        let swept = self.clear_expired(now);
        if swept > 0 {
            log::debug!("Dropped {swept} expired cookie(s)");
        }

        if !self.enabled {
            log::debug!("Cookies disabled, ignoring {} cookie(s) for {url}", set_cookies.len());
            return;
        }
        for header in set_cookies {
            self.merge_one(url, header, source, now);
        }
    }

    fn header_for_at(&self, url: &Url, secure: bool, now: OffsetDateTime) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let header = self
            .matching(url, secure, now)
            .into_iter()
            .map(Cookie::pair)
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            Some(header)
        }
    }

    fn script_cookies_at(&self, url: &Url, now: OffsetDateTime) -> String {
        if !self.enabled {
            return String::new();
        }

        let secure = matches!(url.scheme(), "https" | "wss");
        self.matching(url, secure, now)
            .into_iter()
            .filter(|c| !c.http_only)
            .map(Cookie::pair)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn get_at(&self, name: &str, now: OffsetDateTime) -> Option<Cookie> {
        if !self.enabled {
            return None;
        }
        self.cookies
            .iter()
            .find(|c| c.name == name && !c.is_expired(now))
            .cloned()
    }

    fn get_all_at(&self, now: OffsetDateTime) -> Vec<Cookie> {
        if !self.enabled {
            return Vec::new();
        }
        self.cookies
            .iter()
            .filter(|c| !c.is_expired(now))
            .cloned()
            .collect()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn clear_expired(&mut self, now: OffsetDateTime) -> usize {
        let before = self.cookies.len();
        self.cookies.retain(|c| !c.is_expired(now));
        before - self.cookies.len()
    }

    fn clear(&mut self) {
        self.cookies.clear();
    }

    fn remove(&mut self, name: &str, domain: &str, path: &str) -> bool {
        let before = self.cookies.len();
        self.cookies.retain(|c| c.key() != (name, domain, path));
        before != self.cookies.len()
    }
}

/// Cookie injection guard: the request host must be the domain itself or one of its subdomains.
fn domain_accepted(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    if host.parse::<IpAddr>().is_ok() {
        return false;
    }
    host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}

/// Directory of the request path, up to and including the last `/`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(index) => path[..=index].to_string(),
        None => "/".to_string(),
    }
}
