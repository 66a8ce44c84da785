//! The redirect state machine.
//!
//! Each iteration of [`RedirectChain::run`] sends one hop and then decides:
//! return the response, follow its `Location`, or fail. Per hop:
//!
//! - the caller's additional headers are copied onto the request,
//! - the `Cookie` header is computed from the jar for the hop's URL,
//! - the proxy is chosen again for the hop's host,
//! - `Set-Cookie` headers of the response are merged into the jar, whatever
//!   the status.
//!
//! 307 and 308 replay method and body. 301, 302 and 303 turn any method other
//! than `GET`/`HEAD` into `GET` and drop the body.
use http::header::{COOKIE, LOCATION, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::SessionConfig;
use crate::cookies::CookieJarHandle;
use crate::errors::{NetError, TransportError};
use crate::net::{ProxyConfig, Request, Response, Transport};
use crate::redirect::resolve_location;

/// When to follow redirects and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub enabled: bool,
    pub max_redirects: usize,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_redirects: 20,
        }
    }
}

impl From<&SessionConfig> for RedirectPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            enabled: config.redirects_enabled,
            max_redirects: config.max_redirects,
        }
    }
}

pub fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Method of the follow-up request, and whether the body goes with it.
pub fn redirect_method(status: StatusCode, method: &Method) -> (Method, bool) {
    match status {
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => (method.clone(), true),
        _ if *method == Method::GET || *method == Method::HEAD => (method.clone(), false),
        _ => (Method::GET, false),
    }
}

/// State carried across the hops of one chain.
#[derive(Debug, Clone)]
pub struct RedirectContext {
    original: Request,
    current: Request,
    hops: usize,
    additional_headers: HeaderMap,
    proxy: Option<ProxyConfig>,
}

impl RedirectContext {
    /// Starts a chain for `request`. A `Cookie` header on the request is
    /// dropped; cookies always come from the jar.
    pub fn new(request: Request, proxy: Option<ProxyConfig>) -> Self {
        let mut additional_headers = request.headers.clone();
        additional_headers.remove(COOKIE);

        let mut current = request.clone();
        current.headers = additional_headers.clone();

        Self {
            original: request,
            current,
            hops: 0,
            additional_headers,
            proxy,
        }
    }

    pub fn original(&self) -> &Request {
        &self.original
    }

    /// The request the next hop will send (before cookies and proxy are applied).
    pub fn current(&self) -> &Request {
        &self.current
    }

    /// Number of redirects followed so far.
    pub fn hops(&self) -> usize {
        self.hops
    }

    pub fn additional_headers(&self) -> &HeaderMap {
        &self.additional_headers
    }

    /// Moves to the next hop.
    fn follow(&mut self, status: StatusCode, target: Url) {
        let (method, keep_body) = redirect_method(status, &self.current.method);
        let body = if keep_body { self.current.body.take() } else { None };

        self.current = Request {
            method,
            url: target,
            headers: self.additional_headers.clone(),
            body,
            proxy: None,
        };
        self.hops += 1;
    }
}

/// Result of a completed chain.
#[derive(Debug)]
pub struct ChainOutcome {
    /// The request of the last hop, as sent.
    pub request: Request,
    pub response: Response,
    pub hops: usize,
}

/// Runs the hops of one logical request.
pub struct RedirectChain<'a> {
    transport: &'a dyn Transport,
    cookies: &'a CookieJarHandle,
    policy: RedirectPolicy,
    user_agent: Option<HeaderValue>,
}

impl<'a> RedirectChain<'a> {
    pub fn new(transport: &'a dyn Transport, cookies: &'a CookieJarHandle, policy: RedirectPolicy) -> Self {
        Self {
            transport,
            cookies,
            policy,
            user_agent: None,
        }
    }

    /// Default `User-Agent` for hops whose request does not set one.
    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.and_then(|ua| HeaderValue::from_str(ua).ok());
        self
    }

    pub fn run(&self, mut ctx: RedirectContext, cancel: &CancellationToken) -> Result<ChainOutcome, NetError> {
        let mut last: Option<Response> = None;

        loop {
            if cancel.is_cancelled() {
                log::debug!("Cancelled before hop {} to {}", ctx.hops(), ctx.current().url);
                return Err(NetError::Cancelled);
            }

            let request = self.prepare(&ctx);
            let response = match self.transport.fetch(&request, cancel) {
                Ok(response) => response,
                Err(TransportError::Cancelled) => return Err(NetError::Cancelled),
                Err(source) => {
                    log::warn!("Transport failure for {} {}: {source}", request.method, request.url);
                    return Err(NetError::Transport {
                        source,
                        last: last.map(Box::new),
                    });
                }
            };

            self.cookies.write().store_response_cookies(&request.url, &response.headers);

            let status = response.status;
            if !self.policy.enabled || !is_redirect_status(status) {
                return Ok(Self::done(request, response, &ctx));
            }
            let Some(location) = response.headers.get(LOCATION) else {
                return Ok(Self::done(request, response, &ctx));
            };

            let target = resolve_location(&request.url, location.as_bytes()).map_err(|e| {
                NetError::InvalidLocation(format!("{}: {e}", String::from_utf8_lossy(location.as_bytes())))
            })?;
            if !matches!(target.scheme(), "http" | "https") {
                log::debug!("Not following {status} from {} to {target}", request.url);
                return Ok(Self::done(request, response, &ctx));
            }

            if ctx.hops() >= self.policy.max_redirects {
                log::warn!("Too many redirects for {} ({} hops)", ctx.original().url, ctx.hops() + 1);
                return Err(NetError::TooManyRedirects {
                    hops: ctx.hops() + 1,
                    last: Some(Box::new(response)),
                });
            }

            log::debug!("Redirect {status}: {} -> {target} (hop {})", request.url, ctx.hops() + 1);
            ctx.follow(status, target);
            last = Some(response);
        }
    }

    /// Builds the request actually sent for the current hop.
    fn prepare(&self, ctx: &RedirectContext) -> Request {
        let mut request = ctx.current().clone();
        request.proxy = ctx.proxy.as_ref().and_then(|p| p.proxy_for(&request.url));

        if let Some(ua) = &self.user_agent {
            if !request.headers.contains_key(USER_AGENT) {
                request.headers.insert(USER_AGENT, ua.clone());
            }
        }

        let cookie = self.cookies.read().header_for(&request.url, request.is_secure());
        if let Some(cookie) = cookie {
            match HeaderValue::from_bytes(cookie.as_bytes()) {
                Ok(value) => {
                    request.headers.insert(COOKIE, value);
                }
                Err(_) => log::debug!("Cookie header for {} is not a valid header value", request.url),
            }
        }

        request
    }

    fn done(request: Request, response: Response, ctx: &RedirectContext) -> ChainOutcome {
        ChainOutcome {
            request,
            response,
            hops: ctx.hops(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::DefaultCookieJar;
    use crate::net::ProxyScheme;
    use bytes::Bytes;
    use http::header::HeaderName;
    use parking_lot::{Mutex, RwLock};
    use std::sync::Arc;

    fn jar() -> CookieJarHandle {
        Arc::new(RwLock::new(DefaultCookieJar::new()))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn redirect(req: &Request, status: StatusCode, location: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_str(location).unwrap());
        Response::new(req.url.clone(), status, headers, "")
    }

    fn ok(req: &Request, body: &'static str) -> Response {
        Response::new(req.url.clone(), StatusCode::OK, HeaderMap::new(), body)
    }

    fn run_with<T: Transport>(transport: &T, request: Request, policy: RedirectPolicy) -> Result<ChainOutcome, NetError> {
        let cookies = jar();
        RedirectChain::new(transport, &cookies, policy).run(RedirectContext::new(request, None), &CancellationToken::new())
    }

    #[test]
    fn method_transitions() {
        assert_eq!(redirect_method(StatusCode::MOVED_PERMANENTLY, &Method::POST), (Method::GET, false));
        assert_eq!(redirect_method(StatusCode::FOUND, &Method::POST), (Method::GET, false));
        assert_eq!(redirect_method(StatusCode::SEE_OTHER, &Method::PUT), (Method::GET, false));
        assert_eq!(redirect_method(StatusCode::SEE_OTHER, &Method::HEAD), (Method::HEAD, false));
        assert_eq!(redirect_method(StatusCode::TEMPORARY_REDIRECT, &Method::POST), (Method::POST, true));
        assert_eq!(redirect_method(StatusCode::PERMANENT_REDIRECT, &Method::DELETE), (Method::DELETE, true));
    }

    #[test]
    fn post_is_downgraded_on_301_302_303() {
        for status in [StatusCode::MOVED_PERMANENTLY, StatusCode::FOUND, StatusCode::SEE_OTHER] {
            let sent = Mutex::new(Vec::new());
            let transport = |req: &Request| {
                sent.lock().push((req.method.clone(), req.body.clone()));
                if req.url.path() == "/form" {
                    Ok(redirect(req, status, "/done"))
                } else {
                    Ok::<_, TransportError>(ok(req, "done"))
                }
            };

            let outcome = run_with(&transport, Request::post(url("http://example.com/form"), "a=1"), RedirectPolicy::default()).unwrap();
            assert_eq!(outcome.response.text(), "done");
            assert_eq!(outcome.hops, 1);
            assert_eq!(sent.lock()[1], (Method::GET, None));
        }
    }

    #[test]
    fn post_is_replayed_on_307() {
        let sent = Mutex::new(Vec::new());
        let transport = |req: &Request| {
            sent.lock().push((req.method.clone(), req.body.clone()));
            if req.url.path() == "/form" {
                Ok(redirect(req, StatusCode::TEMPORARY_REDIRECT, "/done"))
            } else {
                Ok::<_, TransportError>(ok(req, "done"))
            }
        };

        run_with(&transport, Request::post(url("http://example.com/form"), "a=1"), RedirectPolicy::default()).unwrap();
        assert_eq!(sent.lock()[1], (Method::POST, Some(Bytes::from_static(b"a=1"))));
    }

    #[test]
    fn additional_headers_survive_every_hop() {
        let seen = Mutex::new(Vec::new());
        let transport = |req: &Request| {
            seen.lock().push(req.headers.get("foo").cloned());
            match req.url.path() {
                "/a" => Ok(redirect(req, StatusCode::FOUND, "http://other.test/b")),
                "/b" => Ok(redirect(req, StatusCode::MOVED_PERMANENTLY, "/c")),
                _ => Ok::<_, TransportError>(ok(req, "c")),
            }
        };

        let request = Request::get(url("http://example.com/a"))
            .with_header(HeaderName::from_static("foo"), HeaderValue::from_static("bar"));
        let outcome = run_with(&transport, request, RedirectPolicy::default()).unwrap();

        assert_eq!(outcome.request.url.as_str(), "http://other.test/c");
        assert_eq!(outcome.hops, 2);
        assert!(seen.lock().iter().all(|h| h.as_ref().is_some_and(|v| v == "bar")));
    }

    #[test]
    fn same_url_loop_hits_the_ceiling() {
        let transport = |req: &Request| Ok::<_, TransportError>(redirect(req, StatusCode::FOUND, "/loop"));

        let err = run_with(&transport, Request::get(url("http://example.com/loop")), RedirectPolicy::default()).unwrap_err();
        match err {
            NetError::TooManyRedirects { hops, last } => {
                assert_eq!(hops, 21);
                assert_eq!(last.unwrap().status, StatusCode::FOUND);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ceiling_allows_exactly_max_redirects() {
        let transport = |req: &Request| {
            let n: usize = req.url.path()[1..].parse().unwrap();
            if n < 20 {
                Ok(redirect(req, StatusCode::FOUND, &format!("/{}", n + 1)))
            } else {
                Ok::<_, TransportError>(ok(req, "end"))
            }
        };

        let outcome = run_with(&transport, Request::get(url("http://example.com/0")), RedirectPolicy::default()).unwrap();
        assert_eq!(outcome.hops, 20);
        assert_eq!(outcome.response.text(), "end");
    }

    #[test]
    fn disabled_redirects_return_the_30x() {
        let transport = |req: &Request| Ok::<_, TransportError>(redirect(req, StatusCode::MOVED_PERMANENTLY, "/elsewhere"));
        let policy = RedirectPolicy {
            enabled: false,
            max_redirects: 20,
        };

        let outcome = run_with(&transport, Request::get(url("http://example.com/")), policy).unwrap();
        assert_eq!(outcome.response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(outcome.hops, 0);
    }

    #[test]
    fn non_http_locations_end_the_chain() {
        let transport = |req: &Request| Ok::<_, TransportError>(redirect(req, StatusCode::FOUND, "ftp://files.test/x"));
        let outcome = run_with(&transport, Request::get(url("http://example.com/")), RedirectPolicy::default()).unwrap();
        assert_eq!(outcome.response.status, StatusCode::FOUND);
    }

    #[test]
    fn cookies_are_recomputed_per_hop() {
        let seen = Mutex::new(Vec::new());
        let transport = |req: &Request| {
            seen.lock().push(req.headers.get(COOKIE).map(|v| v.to_str().unwrap().to_string()));
            match req.url.host_str() {
                Some("a.test") => {
                    let mut resp = redirect(req, StatusCode::FOUND, "http://b.test/");
                    resp.headers.insert("set-cookie", HeaderValue::from_static("from_a=1"));
                    Ok(resp)
                }
                _ => Ok::<_, TransportError>(ok(req, "b")),
            }
        };

        let cookies = jar();
        cookies.write().merge(&url("http://b.test/"), &["for_b=1"], crate::cookies::CookieSource::Http);

        let request = Request::get(url("http://a.test/")).with_header(COOKIE, HeaderValue::from_static("forged=1"));
        RedirectChain::new(&transport, &cookies, RedirectPolicy::default())
            .run(RedirectContext::new(request, None), &CancellationToken::new())
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0], None);
        assert_eq!(seen[1].as_deref(), Some("for_b=1"));
        assert_eq!(cookies.read().get("from_a").unwrap().domain, "a.test");
    }

    #[test]
    fn proxy_is_chosen_per_hop() {
        let seen = Mutex::new(Vec::new());
        let transport = |req: &Request| {
            seen.lock().push(req.proxy.is_some());
            match req.url.host_str() {
                Some("intranet.test") => Ok(redirect(req, StatusCode::FOUND, "http://public.test/")),
                _ => Ok::<_, TransportError>(ok(req, "public")),
            }
        };

        let proxy = ProxyConfig::new(ProxyScheme::Http, "proxy.test", 8080).with_bypass("intranet.test");
        let cookies = jar();
        RedirectChain::new(&transport, &cookies, RedirectPolicy::default())
            .run(RedirectContext::new(Request::get(url("http://intranet.test/")), Some(proxy)), &CancellationToken::new())
            .unwrap();

        assert_eq!(*seen.lock(), vec![false, true]);
    }

    #[test]
    fn transport_failures_carry_the_last_response() {
        let transport = |req: &Request| match req.url.path() {
            "/" => Ok(redirect(req, StatusCode::FOUND, "/down")),
            _ => Err(TransportError::Connect("refused".into())),
        };

        let err = run_with(&transport, Request::get(url("http://example.com/")), RedirectPolicy::default()).unwrap_err();
        assert!(matches!(err, NetError::Transport { source: TransportError::Connect(_), .. }));
        assert_eq!(err.last_response().unwrap().status, StatusCode::FOUND);
    }

    #[test]
    fn cancellation_stops_the_chain() {
        let cancel = CancellationToken::new();
        let transport = |req: &Request| {
            cancel.cancel();
            Ok::<_, TransportError>(redirect(req, StatusCode::FOUND, "/next"))
        };

        let cookies = jar();
        let err = RedirectChain::new(&transport, &cookies, RedirectPolicy::default())
            .run(RedirectContext::new(Request::get(url("http://example.com/")), None), &cancel)
            .unwrap_err();
        assert!(matches!(err, NetError::Cancelled));
    }

    #[test]
    fn default_user_agent_does_not_override_the_request() {
        let seen = Mutex::new(Vec::new());
        let transport = |req: &Request| {
            seen.lock().push(req.headers.get(USER_AGENT).cloned());
            Ok::<_, TransportError>(ok(req, ""))
        };
        let cookies = jar();
        let chain = RedirectChain::new(&transport, &cookies, RedirectPolicy::default()).with_user_agent(Some("Gosub/1.0"));

        chain.run(RedirectContext::new(Request::get(url("http://example.com/")), None), &CancellationToken::new()).unwrap();
        let own = Request::get(url("http://example.com/")).with_header(USER_AGENT, HeaderValue::from_static("Custom"));
        chain.run(RedirectContext::new(own, None), &CancellationToken::new()).unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0].as_ref().unwrap(), "Gosub/1.0");
        assert_eq!(seen[1].as_ref().unwrap(), "Custom");
    }
}
