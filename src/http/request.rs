//! Request handling and transformation.
//!
//! # Responsibilities
//! - Reconstruct the absolute target URL of an inbound request
//! - Keep only the forwardable client headers
//! - Build the origin request: scheme upgrade, Referer/Origin repair, cookies
//!
//! # Design Decisions
//! - Only a fixed whitelist of client headers reaches the origin
//! - Referer, Origin and Cookie are rebuilt rather than copied
//! - GET and HEAD never carry a body; everything else forwards the raw bytes

use axum::body::Bytes;
use axum::http::header::{
    HeaderName, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, HOST, ORIGIN, REFERER, USER_AGENT,
};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::http::cookies::CookiePolicy;
use crate::policy::HostPolicyStore;

/// Client headers copied verbatim to the origin.
pub const FORWARDED_HEADERS: [HeaderName; 3] = [ACCEPT_LANGUAGE, USER_AGENT, CONTENT_TYPE];

/// Everything the pipeline needs to know about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Absolute URL the client asked for.
    pub url: Url,
    /// Lowercased hostname of `url`, without port.
    pub host: String,
    /// Whitelisted headers plus Referer and Cookie.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestContext {
    /// Build the context from the request head and the buffered body.
    ///
    /// Absolute-form targets (what a client sends to a configured proxy) are
    /// used as-is. Origin-form targets are completed from the `Host` header.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Result<Self> {
        let url = if parts.uri.scheme().is_some() && parts.uri.authority().is_some() {
            Url::parse(&parts.uri.to_string())
        } else {
            let host = parts
                .headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .ok_or_else(|| ProxyError::InvalidRequest("no target host".into()))?;
            let path = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            Url::parse(&format!("http://{}{}", host, path))
        }
        .map_err(|e| ProxyError::InvalidRequest(format!("bad target URL: {}", e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidRequest("target URL has no host".into()))?
            .to_ascii_lowercase();

        let mut headers = HeaderMap::new();
        let kept = [ACCEPT_LANGUAGE, USER_AGENT, CONTENT_TYPE, REFERER, COOKIE];
        for name in kept {
            for value in parts.headers.get_all(&name) {
                headers.append(name.clone(), value.clone());
            }
        }

        Ok(Self {
            method: parts.method.clone(),
            url,
            host,
            headers,
            body,
        })
    }
}

/// Fully-resolved request to send to the origin.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    /// Attach this request to a client. The client must not follow redirects.
    pub fn into_reqwest(self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let builder = client
            .request(self.method, self.url)
            .headers(self.headers);
        match self.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}

/// Builds origin requests against the shared host policy.
pub struct OriginRequestBuilder<'a> {
    policy: &'a HostPolicyStore,
    cookies: CookiePolicy,
}

impl<'a> OriginRequestBuilder<'a> {
    pub fn new(policy: &'a HostPolicyStore, cookies: CookiePolicy) -> Self {
        Self { policy, cookies }
    }

    pub fn build(&self, ctx: &RequestContext) -> OutboundRequest {
        let mut headers = HeaderMap::new();
        for name in FORWARDED_HEADERS.iter() {
            if let Some(value) = ctx.headers.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }

        if let Some(referer) = ctx.headers.get(REFERER).and_then(|v| v.to_str().ok()) {
            self.repair_referer(referer, &mut headers);
        }

        if let Some(cookie) = self.cookies.outbound(&ctx.headers) {
            headers.insert(COOKIE, cookie);
        }

        let body = match ctx.method {
            Method::GET | Method::HEAD => None,
            _ => Some(ctx.body.clone()),
        };

        OutboundRequest {
            method: ctx.method.clone(),
            url: self.policy.upgrade(&ctx.url),
            headers,
            body,
        }
    }

    /// Point Referer/Origin at HTTPS when the referring host demands it.
    fn repair_referer(&self, referer: &str, headers: &mut HeaderMap) {
        let mut url = match Url::parse(referer) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(referer = %referer, error = %e, "Dropping unparsable Referer");
                return;
            }
        };
        if url.host_str().is_some_and(|h| self.policy.is_force_secure(h)) {
            // http and https are both special schemes, so this cannot fail
            let _ = url.set_scheme("https");
        }
        if let Ok(value) = HeaderValue::from_str(url.as_str()) {
            headers.insert(REFERER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&url.origin().ascii_serialization()) {
            headers.insert(ORIGIN, value);
        }
    }
}
