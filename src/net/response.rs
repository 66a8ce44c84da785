//! Buffered HTTP response model.
//!
//! A [`Response`] is what a [`Transport`](crate::net::Transport) hands back and
//! what [`Session::perform`](crate::Session::perform) returns. It contains the
//! URL it was fetched from, the status code, the headers and the raw body.
//!
//! ## Release hooks
//! A response may own an external resource (a download spool file, a native
//! buffer, ...). The producer attaches a *release hook* for it with
//! [`Response::with_release_hook`]. Whoever owns the response runs the hook
//! exactly once:
//! - explicitly via [`Response::release`] (the cache does this on eviction), or
//! - implicitly when the response is dropped without having been released.
//!
//! Copies made with [`Response::detached`] never carry the hook, so a cache hit
//! handed to a caller can be dropped without freeing the cached resource.
//!
//! A failing hook is logged and otherwise ignored.
use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use url::Url;

/// Cleanup callback for the resources a response holds.
pub type ReleaseHook = Box<dyn FnOnce() -> anyhow::Result<()> + Send + Sync>;

pub struct Response {
    /// URL this response was fetched from.
    pub url: Url,

    /// HTTP status code (e.g., `200`, `404`).
    pub status: StatusCode,

    /// Response headers as a case-insensitive map.
    pub headers: HeaderMap,

    /// Raw response body bytes.
    ///
    /// Convert to text with `String::from_utf8_lossy`, or parse as binary/JSON
    /// depending on the `Content-Type`.
    pub body: Bytes,

    release: Option<ReleaseHook>,
}

impl Response {
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers,
            body: body.into(),
            release: None,
        }
    }

    /// Attaches the cleanup callback for this response's resources.
    pub fn with_release_hook(mut self, hook: impl FnOnce() -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// Human-readable reason phrase (e.g. `"OK"`), `"Unknown"` for non-standard codes.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Unknown")
    }

    /// True for 2xx status codes.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as (lossy) UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns `true` while a release hook is still pending on this response.
    pub fn has_release_hook(&self) -> bool {
        self.release.is_some()
    }

    /// Copy of this response without the release hook.
    pub fn detached(&self) -> Response {
        Response::new(self.url.clone(), self.status, self.headers.clone(), self.body.clone())
    }

    /// Runs the release hook, if it has not run yet.
    pub fn release(&mut self) {
        let Some(hook) = self.release.take() else {
            return;
        };

        if let Err(e) = hook() {
            log::error!("Release hook for {} failed: {e:#}", self.url);
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("release_pending", &self.release.is_some())
            .finish()
    }
}
