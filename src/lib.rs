pub mod cache;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod net;
pub mod redirect;
pub mod session;

pub use cache::{CacheHandle, CacheStore};
pub use config::{ConfigError, SessionConfig};
pub use cookies::{Cookie, CookieJar, CookieJarHandle, DefaultCookieJar};
pub use errors::{NetError, TransportError};
pub use net::{Request, Response, Transport};
pub use session::{Session, SessionHandle, SessionId};
