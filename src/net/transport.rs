//! The transport seam.
//!
//! Everything below this layer (sockets, TLS, connection pooling, timeouts) is
//! hidden behind [`Transport::fetch`]. The session calls it synchronously and
//! blocks on it, one hop at a time.
//!
//! [`HttpTransport`] is the real implementation, backed by `reqwest` running on
//! its own tokio runtime. Redirect following and cookie handling are switched
//! off in reqwest: both are decided by this crate.
//!
//! `HttpTransport::fetch` may be called from plain threads and from worker
//! threads of a multi-threaded tokio runtime. Calling it from a
//! current-thread runtime panics.
//!
//! Closures of the shape `Fn(&Request) -> Result<Response, TransportError>`
//! implement [`Transport`] too, which is handy for scripted tests.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::net::proxy::ProxyTarget;
use crate::net::{Request, Response};

pub trait Transport: Send + Sync {
    /// Performs exactly one HTTP exchange. Never follows redirects.
    fn fetch(&self, request: &Request, cancel: &CancellationToken) -> Result<Response, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&Request) -> Result<Response, TransportError> + Send + Sync,
{
    fn fetch(&self, request: &Request, cancel: &CancellationToken) -> Result<Response, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        self(request)
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    timeout: Option<Duration>,
    user_agent: Option<String>,
    runtime: Option<Arc<Runtime>>,
}

impl HttpTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Runs requests on an existing runtime instead of creating one.
    ///
    /// `fetch` blocks on this runtime, so it must not be called from one of its own worker threads.
    pub fn runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let runtime = match self.runtime {
            Some(rt) => rt,
            None => Arc::new(
                tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| TransportError::Other(format!("cannot create runtime: {e}")))?,
            ),
        };

        let transport = HttpTransport {
            runtime,
            timeout: self.timeout,
            user_agent: self.user_agent,
            clients: Mutex::new(HashMap::new()),
        };
        // Build the direct client eagerly so configuration errors surface here.
        transport.client_for(None)?;
        Ok(transport)
    }
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    runtime: Arc<Runtime>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    /// One client per proxy target (`None` = direct).
    clients: Mutex<HashMap<Option<ProxyTarget>, reqwest::Client>>,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder {
            timeout: Some(Duration::from_secs(90)),
            user_agent: None,
            runtime: None,
        }
    }

    fn client_for(&self, proxy: Option<&ProxyTarget>) -> Result<reqwest::Client, TransportError> {
        let key = proxy.cloned();
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        if let Some(target) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(target.to_string())?);
        }

        let client = builder.build()?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: &Request, cancel: &CancellationToken) -> Result<Response, TransportError> {
        let client = self.client_for(request.proxy.as_ref())?;

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        log::trace!("{} {} (proxy: {:?})", request.method, request.url, request.proxy);

        let exchange = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Cancelled),
                res = send(builder) => res,
            }
        };

        // Blocking a worker thread of another runtime needs to be announced first.
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::task::block_in_place(|| self.runtime.block_on(exchange))
        } else {
            self.runtime.block_on(exchange)
        }
    }
}

async fn send(builder: reqwest::RequestBuilder) -> Result<Response, TransportError> {
    let res = builder.send().await?;

    let url = res.url().clone();
    let status = res.status();
    let headers = res.headers().clone();

    // Fully buffered; no streaming at this layer.
    let body = res.bytes().await?;

    Ok(Response::new(url, status, headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};
    use url::Url;

    #[test]
    fn closures_are_transports() {
        let transport = |req: &Request| {
            Ok::<_, TransportError>(Response::new(req.url.clone(), StatusCode::NO_CONTENT, HeaderMap::new(), ""))
        };
        let req = Request::get(Url::parse("http://example.com/").unwrap());

        let resp = transport.fetch(&req, &CancellationToken::new()).unwrap();
        assert_eq!(resp.status, StatusCode::NO_CONTENT);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(transport.fetch(&req, &cancel), Err(TransportError::Cancelled)));
    }

    #[test]
    fn builds_direct_and_proxied_clients() {
        let transport = HttpTransport::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("Gosub/1.0")
            .build()
            .unwrap();

        let target = ProxyTarget {
            scheme: crate::net::ProxyScheme::Http,
            host: "127.0.0.1".into(),
            port: 3128,
        };
        transport.client_for(Some(&target)).unwrap();
        transport.client_for(Some(&target)).unwrap();
        assert_eq!(transport.clients.lock().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_works_from_inside_a_runtime() {
        let transport = HttpTransport::builder().build().unwrap();
        let req = Request::get(Url::parse("http://127.0.0.1:9/").unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(transport.fetch(&req, &cancel), Err(TransportError::Cancelled)));

        // A runtime cannot be dropped from async context.
        tokio::task::block_in_place(move || drop(transport));
    }
}
