//! Proxy selection.
//!
//! A session carries at most one [`ProxyConfig`]. For every hop of a redirect
//! chain the config is asked again which [`ProxyTarget`] (if any) to use for
//! the hop's host, so a host bypassed on one hop does not leak that decision
//! into the next.
//!
//! Bypass entries follow the usual `no_proxy` conventions:
//! - `*` bypasses every host,
//! - `example.com` and `.example.com` bypass the domain and all its subdomains,
//! - `*.example.com` bypasses subdomains only,
//! - anything else must match the host exactly (IP addresses included).
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Http,
    Socks5,
}

impl ProxyScheme {
    fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub bypass: Vec<String>,
}

/// The proxy one particular hop goes through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyTarget {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl ProxyConfig {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            bypass: Vec::new(),
        }
    }

    pub fn with_bypass(mut self, pattern: impl Into<String>) -> Self {
        self.bypass.push(pattern.into());
        self
    }

    /// Returns the proxy to use for `url`, or `None` when the host is bypassed.
    pub fn proxy_for(&self, url: &Url) -> Option<ProxyTarget> {
        let host = url.host_str().unwrap_or_default().trim_matches(|c| c == '[' || c == ']');
        if self.bypass.iter().any(|pattern| bypasses(pattern.trim(), host)) {
            return None;
        }

        Some(ProxyTarget {
            scheme: self.scheme,
            host: self.host.clone(),
            port: self.port,
        })
    }
}

fn bypasses(pattern: &str, host: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern == "*" {
        return true;
    }

    let pattern = pattern.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host.ends_with(&format!(".{suffix}"));
    }

    let domain = pattern.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{domain}"))
}
