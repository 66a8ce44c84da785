// src/session/session.rs
//! The session façade.
//!
//! A [`Session`] is the state shared by every window and frame of one browser
//! client: one response cache, one cookie jar, one transport and one
//! configuration. It is passed around as a [`SessionHandle`]; there is no
//! process-wide session, so several independent sessions can live side by
//! side and each can be torn down on its own.
//!
//! [`Session::perform`] is the single entry point for network requests:
//! cache lookup, then the redirect chain against the transport, then cache
//! admission of the final response.
use std::fmt::Display;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::cache::{CacheHandle, CacheStore};
use crate::config::SessionConfig;
use crate::cookies::{CookieJar, CookieJarHandle, CookieSource, DefaultCookieJar};
use crate::errors::NetError;
use crate::net::{Request, Response, Transport};
use crate::redirect::{RedirectChain, RedirectContext, RedirectPolicy};

/// A unique identifier for a session, represented as a UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to a session.
pub type SessionHandle = Arc<Session>;

pub struct Session {
    /// ID of the session, used in log lines
    pub id: SessionId,
    config: SessionConfig,
    cache: CacheHandle,
    cookie_jar: CookieJarHandle,
    transport: Arc<dyn Transport>,
}

impl Session {
    /// Creates a session with a fresh cache and an in-memory cookie jar.
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        let mut jar = DefaultCookieJar::new();
        jar.set_enabled(config.cookies_enabled);
        Self::with_cookie_jar(config, transport, Arc::new(RwLock::new(jar)))
    }

    /// Creates a session around an existing cookie jar (for instance one shared with another session).
    pub fn with_cookie_jar(config: SessionConfig, transport: Arc<dyn Transport>, cookie_jar: CookieJarHandle) -> Self {
        let cache = Arc::new(RwLock::new(CacheStore::new(config.cache_max_size)));
        Self {
            id: SessionId::new(),
            config,
            cache,
            cookie_jar,
            transport,
        }
    }

    pub fn into_handle(self) -> SessionHandle {
        Arc::new(self)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cache(&self) -> CacheHandle {
        self.cache.clone()
    }

    pub fn cookie_jar(&self) -> CookieJarHandle {
        self.cookie_jar.clone()
    }

    /// Performs `request`, following redirects as configured.
    ///
    /// Failing status codes come back as normal responses unless
    /// `throw_on_failing_status` is set, in which case they are returned as
    /// [`NetError::FailingStatus`].
    ///
    /// Blocks the calling thread. With [`HttpTransport`](crate::net::HttpTransport) this is fine from
    /// a multi-threaded tokio worker but panics on a current-thread runtime.
    pub fn perform(&self, request: Request) -> Result<Response, NetError> {
        self.perform_with_cancel(request, &CancellationToken::new())
    }

    /// Like [`perform`](Self::perform), abandoning the chain once `cancel` fires.
    pub fn perform_with_cancel(&self, request: Request, cancel: &CancellationToken) -> Result<Response, NetError> {
        let hit = self.cache.read().lookup(&request);
        if let Some(response) = hit {
            log::debug!("[{}] {} {} served from cache", self.id, request.method, request.url);
            return self.check_status(response);
        }

        let chain = RedirectChain::new(self.transport.as_ref(), &self.cookie_jar, RedirectPolicy::from(&self.config))
            .with_user_agent(self.config.user_agent.as_deref());

        let outcome = chain.run(RedirectContext::new(request, self.config.proxy.clone()), cancel)?;
        log::debug!(
            "[{}] {} {} -> {} after {} redirect(s)",
            self.id,
            outcome.request.method,
            outcome.request.url,
            outcome.response.status,
            outcome.hops
        );

        let response = self.cache.write().store(&outcome.request, outcome.response);
        self.check_status(response)
    }

    /// Routes `document.cookie = cookie` from a page at `document_url` into the jar.
    pub fn set_cookie_from_script(&self, document_url: &Url, cookie: &str) {
        self.cookie_jar.write().merge(document_url, &[cookie], CookieSource::Script);
    }

    /// What `document.cookie` reads on a page at `document_url`.
    pub fn cookie_string_for_script(&self, document_url: &Url) -> String {
        self.cookie_jar.read().script_cookies(document_url)
    }

    /// Releases every cached response and forgets all cookies.
    pub fn teardown(&self) {
        log::debug!("[{}] Tearing down session", self.id);
        self.cache.write().clear();
        self.cookie_jar.write().clear();
    }

    fn check_status(&self, response: Response) -> Result<Response, NetError> {
        if self.config.throw_on_failing_status && response.status.as_u16() >= 400 {
            return Err(NetError::FailingStatus(Box::new(response)));
        }
        Ok(response)
    }
}
