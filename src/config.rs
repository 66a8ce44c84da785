//! Session configuration.
//!
//! `SessionConfig` controls how a [`Session`](crate::session::Session)
//! performs requests: cache capacity, whether cookies are kept, how redirects
//! are followed, the default user agent and the proxy.
//!
//! `SessionConfig` provides defaults via [`Default`] and a fluent
//! [`SessionConfig::builder()`] that validates on `build()`. It can also be
//! read from JSON.
//!
//! # Examples
//!
//! ```rust
//! use gosub_net::config::SessionConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = SessionConfig::builder()
//!     .cache_max_size(100)
//!     .max_redirects(10)
//!     .user_agent("Gosub/0.1")
//!     .throw_on_failing_status(true)
//!     .build()?;
//! assert_eq!(cfg.max_redirects, 10);
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `cache_max_size`: Maximum number of cached responses (default: 25).
//! - `cookies_enabled`: Keep and send cookies (default: true).
//! - `redirects_enabled`: Follow 30x redirects (default: true).
//! - `max_redirects`: Redirect ceiling per request (default: 20).
//! - `throw_on_failing_status`: Turn 4xx/5xx final responses into errors (default: false).
//! - `user_agent`: Sent on every hop unless the request carries its own.
//! - `proxy`: Optional proxy, re-evaluated for every hop.
//!
//! # Errors
//!
//! Builder validation returns [`ConfigError`] when `cache_max_size == 0` or
//! when redirects are enabled with `max_redirects == 0`.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cache_max_size: usize,
    pub cookies_enabled: bool,
    pub redirects_enabled: bool,
    pub max_redirects: usize,
    pub throw_on_failing_status: bool,
    pub user_agent: Option<String>,
    pub proxy: Option<ProxyConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_max_size: 25,
            cookies_enabled: true,
            redirects_enabled: true,
            max_redirects: 20,
            throw_on_failing_status: false,
            user_agent: None,
            proxy: None,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Reads and validates a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: SessionConfig = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate(&cfg)?;
        Ok(cfg)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    inner: SessionConfig,
}

impl SessionConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut SessionConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn cache_max_size(self, n: usize) -> Self { self.map(|c| c.cache_max_size = n) }
    pub fn cookies_enabled(self, on: bool) -> Self { self.map(|c| c.cookies_enabled = on) }
    pub fn redirects_enabled(self, on: bool) -> Self { self.map(|c| c.redirects_enabled = on) }
    pub fn max_redirects(self, n: usize) -> Self { self.map(|c| c.max_redirects = n) }
    pub fn throw_on_failing_status(self, on: bool) -> Self { self.map(|c| c.throw_on_failing_status = on) }
    pub fn user_agent<S: Into<String>>(self, ua: S) -> Self { self.map(|c| c.user_agent = Some(ua.into())) }
    pub fn proxy(self, proxy: ProxyConfig) -> Self { self.map(|c| c.proxy = Some(proxy)) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut SessionConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroCacheSize,
    ZeroRedirects,
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCacheSize =>
                write!(f, "cache_max_size must be at least 1"),
            ConfigError::ZeroRedirects =>
                write!(f, "max_redirects must be at least 1 when redirects are enabled"),
            ConfigError::Parse(e) =>
                write!(f, "invalid session config: {e}"),
        }
    }
}
impl std::error::Error for ConfigError {}

fn validate(c: &SessionConfig) -> Result<(), ConfigError> {
    if c.cache_max_size == 0 {
        return Err(ConfigError::ZeroCacheSize);
    }
    if c.redirects_enabled && c.max_redirects == 0 {
        return Err(ConfigError::ZeroRedirects);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ProxyScheme;

    #[test]
    fn defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.cache_max_size, 25);
        assert_eq!(cfg.max_redirects, 20);
        assert!(cfg.cookies_enabled);
        assert!(cfg.redirects_enabled);
        assert!(!cfg.throw_on_failing_status);
        assert_eq!(SessionConfig::builder().build(), Ok(cfg));
    }

    #[test]
    fn builder_validates() {
        assert_eq!(SessionConfig::builder().cache_max_size(0).build(), Err(ConfigError::ZeroCacheSize));
        assert_eq!(SessionConfig::builder().max_redirects(0).build(), Err(ConfigError::ZeroRedirects));

        let cfg = SessionConfig::builder()
            .with(|c| {
                c.redirects_enabled = false;
                c.max_redirects = 0;
            })
            .build()
            .unwrap();
        assert!(!cfg.redirects_enabled);
    }

    #[test]
    fn reads_json_with_defaults() {
        let cfg = SessionConfig::from_json(
            r#"{
                "max_redirects": 5,
                "user_agent": "Gosub/0.1",
                "proxy": { "scheme": "socks5", "host": "127.0.0.1", "port": 1080, "bypass": ["localhost"] }
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.max_redirects, 5);
        assert_eq!(cfg.cache_max_size, 25);
        assert_eq!(cfg.user_agent.as_deref(), Some("Gosub/0.1"));
        let proxy = cfg.proxy.unwrap();
        assert_eq!(proxy.scheme, ProxyScheme::Socks5);
        assert_eq!(proxy.bypass, vec!["localhost".to_string()]);
    }

    #[test]
    fn rejects_bad_json() {
        assert!(matches!(SessionConfig::from_json("{"), Err(ConfigError::Parse(_))));
        assert_eq!(SessionConfig::from_json(r#"{"cache_max_size": 0}"#), Err(ConfigError::ZeroCacheSize));
    }
}
