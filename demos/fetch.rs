use gosub_net::net::HttpTransport;
use gosub_net::{NetError, Request, Session, SessionConfig};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let target = std::env::args().nth(1).unwrap_or_else(|| "http://example.com/".to_string());
    let url = Url::parse(&target)?;

    // The session owns redirects, cookies and caching. The transport only does single exchanges.
    let config = SessionConfig::builder()
        .user_agent("Gosub/0.1 (gosub-net fetch demo)")
        .max_redirects(10)
        .build()?;

    let transport = HttpTransport::builder().timeout(Duration::from_secs(30)).build()?;
    let session = Session::new(config, Arc::new(transport)).into_handle();

    for attempt in 1..=2 {
        match session.perform(Request::get(url.clone())) {
            Ok(response) => {
                println!(
                    "#{attempt}: {} {} ({} bytes) from {}",
                    response.status.as_u16(),
                    response.status_text(),
                    response.body.len(),
                    response.url
                );
            }
            Err(NetError::TooManyRedirects { hops, .. }) => {
                println!("#{attempt}: gave up after {hops} redirects");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let cache = session.cache();
    let stats = cache.read().stats();
    println!("cache: {} entries, {} hits, {} misses", cache.read().size(), stats.hits, stats.misses);

    for cookie in session.cookie_jar().read().get_all() {
        println!("cookie: {}={} (domain {}, path {})", cookie.name, cookie.value, cookie.domain, cookie.path);
    }

    session.teardown();
    Ok(())
}
