//! Cookie handling in both directions.
//!
//! Outbound `Cookie` values are percent-encoded before they reach the
//! origin. Inbound `Set-Cookie` entries lose their `secure` directive since
//! the client is always addressed over plain HTTP and would never send a
//! secure cookie back.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

/// Characters left alone by `encodeURIComponent`-style encoding.
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static SECURE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);\s*secure\s*(;|$)").expect("static regex"));

/// Cookie forwarding policy for one proxy instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    blocked: bool,
}

impl CookiePolicy {
    pub fn new(blocked: bool) -> Self {
        Self { blocked }
    }

    /// Build the outbound `Cookie` header from the client's headers.
    pub fn outbound(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        if self.blocked {
            return None;
        }
        let raw = headers.get(COOKIE)?.to_str().ok()?;
        let encoded = encode_cookie_header(raw);
        if encoded.is_empty() {
            return None;
        }
        HeaderValue::from_str(&encoded).ok()
    }

    /// Copy the upstream `Set-Cookie` entries into `out`, minus `secure`.
    pub fn inbound(&self, upstream: &HeaderMap, out: &mut HeaderMap) {
        if self.blocked {
            return;
        }
        for value in upstream.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                tracing::debug!("Dropping non-ASCII Set-Cookie header");
                continue;
            };
            if let Ok(fixed) = HeaderValue::from_str(&strip_secure(raw)) {
                out.append(SET_COOKIE, fixed);
            }
        }
    }
}

/// Percent-encode the value half of every `name=value` pair.
///
/// Pairs are split on `;` with surrounding whitespace ignored and rejoined
/// with `"; "`. Order and names are preserved; a pair without `=` passes
/// through unchanged.
pub fn encode_cookie_header(raw: &str) -> String {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => {
                format!("{}={}", name, utf8_percent_encode(value, COOKIE_VALUE))
            }
            None => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Remove every `secure` directive from a `Set-Cookie` value.
pub fn strip_secure(set_cookie: &str) -> String {
    let mut current = set_cookie.to_string();
    // adjacent directives share a `;`, so one pass can leave a second match
    loop {
        let next = SECURE_DIRECTIVE.replace_all(&current, "$1").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}
