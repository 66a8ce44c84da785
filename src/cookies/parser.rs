//! `Set-Cookie` tokenizer.
//!
//! A header value is split once into the cookie pair and a list of typed
//! [`Attribute`]s. Attribute values that cannot be interpreted are recorded as
//! "absent" (`None`) instead of failing the whole cookie, so the jar can apply
//! the usual fallbacks (session cookie, default path, ...).
use time::OffsetDateTime;

use crate::cookies::SameSite;
use crate::net::http_date::parse_http_date;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Domain(String),
    Path(String),
    /// `None` when the date could not be parsed.
    Expires(Option<OffsetDateTime>),
    MaxAge(i64),
    Secure,
    HttpOnly,
    Version(u32),
    SameSite(SameSite),
    /// Unknown attribute, or a known one with an unusable value.
    Other(String),
}

/// One parsed `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    /// Raw value, quoting preserved.
    pub value: String,
    pub attributes: Vec<Attribute>,
}

impl SetCookie {
    /// Last `Domain` attribute with a non-empty value, leading dots removed and lowercased.
    pub fn domain(&self) -> Option<String> {
        self.attributes
            .iter()
            .rev()
            .find_map(|a| match a {
                Attribute::Domain(d) => Some(d.trim_start_matches('.').to_ascii_lowercase()),
                _ => None,
            })
            .filter(|d| !d.is_empty())
    }

    pub fn path(&self) -> Option<&str> {
        self.attributes.iter().rev().find_map(|a| match a {
            Attribute::Path(p) => Some(p.as_str()),
            _ => None,
        })
    }

    pub fn max_age(&self) -> Option<i64> {
        self.attributes.iter().rev().find_map(|a| match a {
            Attribute::MaxAge(n) => Some(*n),
            _ => None,
        })
    }

    /// `Some(None)` when `Expires` was present but unparseable.
    pub fn expires(&self) -> Option<Option<OffsetDateTime>> {
        self.attributes.iter().rev().find_map(|a| match a {
            Attribute::Expires(at) => Some(*at),
            _ => None,
        })
    }

    pub fn version(&self) -> Option<u32> {
        self.attributes.iter().rev().find_map(|a| match a {
            Attribute::Version(v) => Some(*v),
            _ => None,
        })
    }

    pub fn same_site(&self) -> Option<SameSite> {
        self.attributes.iter().rev().find_map(|a| match a {
            Attribute::SameSite(s) => Some(*s),
            _ => None,
        })
    }

    pub fn secure(&self) -> bool {
        self.attributes.contains(&Attribute::Secure)
    }

    pub fn http_only(&self) -> bool {
        self.attributes.contains(&Attribute::HttpOnly)
    }
}

/// Parses a single `Set-Cookie` value. Returns `None` when there is no usable `name=value` pair.
pub fn parse_set_cookie(header: &str) -> Option<SetCookie> {
    let (name, rest) = header.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || name.contains(';') {
        return None;
    }

    let (value, attrs) = split_value(rest.trim_start());
    let attributes = attrs
        .split(';')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(parse_attribute)
        .collect();

    Some(SetCookie {
        name: name.to_string(),
        value: value.trim_end().to_string(),
        attributes,
    })
}

/// Splits `rest` into the raw value and the attribute list. A quoted value
/// runs to its closing quote, so it may contain `;`.
fn split_value(rest: &str) -> (&str, &str) {
    if let Some(quoted) = rest.strip_prefix('"') {
        if let Some(close) = quoted.find('"') {
            let end = close + 2;
            return match rest[end..].find(';') {
                Some(semi) => (&rest[..end + semi], &rest[end + semi + 1..]),
                None => (rest, ""),
            };
        }
    }

    match rest.split_once(';') {
        Some((value, attrs)) => (value, attrs),
        None => (rest, ""),
    }
}

fn parse_attribute(token: &str) -> Attribute {
    let (key, value) = match token.split_once('=') {
        Some((k, v)) => (k.trim(), v.trim()),
        None => (token, ""),
    };

    match key.to_ascii_lowercase().as_str() {
        "domain" if !value.is_empty() => Attribute::Domain(value.to_string()),
        "path" if value.starts_with('/') => Attribute::Path(value.to_string()),
        "expires" => Attribute::Expires(parse_http_date(value)),
        "max-age" => parse_max_age(value).map_or_else(|| Attribute::Other(token.to_string()), Attribute::MaxAge),
        "secure" => Attribute::Secure,
        "httponly" => Attribute::HttpOnly,
        "version" => value
            .trim_matches('"')
            .parse()
            .map_or_else(|_| Attribute::Other(token.to_string()), Attribute::Version),
        "samesite" => match value.to_ascii_lowercase().as_str() {
            "strict" => Attribute::SameSite(SameSite::Strict),
            "lax" => Attribute::SameSite(SameSite::Lax),
            "none" => Attribute::SameSite(SameSite::None),
            _ => Attribute::Other(token.to_string()),
        },
        _ => Attribute::Other(token.to_string()),
    }
}

/// Digits with an optional leading `-`. Overflowing values saturate.
fn parse_max_age(value: &str) -> Option<i64> {
    let (negative, digits) = match value.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, value),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -n } else { n })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_pair_and_attributes() {
        let c = parse_set_cookie(
            "sid=abc123; Domain=.Example.COM; Path=/app; Expires=Wed, 09 Jun 2021 10:18:14 GMT; Secure; HttpOnly; SameSite=lax; Version=1",
        )
        .unwrap();

        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.domain().as_deref(), Some("example.com"));
        assert_eq!(c.path(), Some("/app"));
        assert_eq!(c.expires(), Some(Some(datetime!(2021-06-09 10:18:14 UTC))));
        assert!(c.secure());
        assert!(c.http_only());
        assert_eq!(c.same_site(), Some(SameSite::Lax));
        assert_eq!(c.version(), Some(1));
    }

    #[test]
    fn unquoted_values_stay_raw() {
        let c = parse_set_cookie("a=b=c:d<e; path=/").unwrap();
        assert_eq!(c.value, "b=c:d<e");
    }

    #[test]
    fn quoted_values_keep_their_quotes() {
        let c = parse_set_cookie("a=\"x;y\"; Path=/").unwrap();
        assert_eq!(c.value, "\"x;y\"");
        assert_eq!(c.path(), Some("/"));

        let c = parse_set_cookie("a=\"unterminated; Path=/").unwrap();
        assert_eq!(c.value, "\"unterminated");
    }

    #[test]
    fn bad_attribute_values_are_treated_as_absent() {
        let c = parse_set_cookie("a=1; Expires=never; Max-Age=soon; Path=relative; Domain=").unwrap();
        assert_eq!(c.expires(), Some(None));
        assert_eq!(c.max_age(), None);
        assert_eq!(c.path(), None);
        assert_eq!(c.domain(), None);
    }

    #[test]
    fn last_attribute_wins() {
        let c = parse_set_cookie("a=1; Max-Age=10; Max-Age=-5; Path=/a; Path=/b; Domain=a.com; Domain=.B.Com").unwrap();
        assert_eq!(c.max_age(), Some(-5));
        assert_eq!(c.path(), Some("/b"));
        assert_eq!(c.domain().as_deref(), Some("b.com"));

        let c = parse_set_cookie("a=1; Domain=example.com; Domain=.").unwrap();
        assert_eq!(c.domain(), None);
    }

    #[test]
    fn rejects_headers_without_a_pair() {
        assert!(parse_set_cookie("novalue").is_none());
        assert!(parse_set_cookie("=1").is_none());
        assert!(parse_set_cookie("").is_none());
    }
}
