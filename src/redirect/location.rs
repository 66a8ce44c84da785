//! `Location` header resolution.
//!
//! Servers regularly put raw UTF-8 (or Latin-1) bytes into `Location`. Those
//! bytes are percent-encoded one by one before the value is resolved against
//! the URL of the request that produced the redirect. Existing `%XX` escapes
//! are kept as they are, so an already encoded location is not encoded twice.
use url::{ParseError, Url};

/// Resolves the raw bytes of a `Location` header against `base`.
pub fn resolve_location(base: &Url, raw: &[u8]) -> Result<Url, ParseError> {
    base.join(&encode_raw_bytes(raw))
}

fn encode_raw_bytes(raw: &[u8]) -> String {
    let trimmed = raw.trim_ascii();
    let mut out = String::with_capacity(trimmed.len());

    for (i, &b) in trimmed.iter().enumerate() {
        match b {
            b'%' if is_escape(&trimmed[i + 1..]) => out.push('%'),
            b'%' => out.push_str("%25"),
            0x21..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn is_escape(rest: &[u8]) -> bool {
    rest.len() >= 2 && rest[0].is_ascii_hexdigit() && rest[1].is_ascii_hexdigit()
}
