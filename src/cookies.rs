//! Cookies: the [`Cookie`] record, the `Set-Cookie` tokenizer and the
//! [`CookieJar`] a session keeps them in.

mod cookie_jar;
mod cookies;
mod parser;

pub use cookie_jar::CookieJar;
pub use cookie_jar::DefaultCookieJar;
pub use cookies::Cookie;
pub use cookies::CookieJarHandle;
pub use cookies::CookieSource;
pub use cookies::SameSite;
pub use parser::{parse_set_cookie, Attribute, SetCookie};
