//! Response handling and transformation.
//!
//! # Responsibilities
//! - Buffer the origin response into an [`UpstreamResponse`]
//! - Assemble client responses from transformed bodies
//! - Map every pipeline failure to the uniform 502 page
//!
//! # Design Decisions
//! - Bodies are buffered whole; every transform needs the complete document
//! - Hop-by-hop headers and `Content-Length` are never copied from the origin

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderName, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use encoding_rs::{Encoding, UTF_8};

use crate::error::{ProxyError, Result};
use crate::http::request::OutboundRequest;

/// Body of every 502 the proxy produces.
pub const BAD_GATEWAY_HTML: &str = r#"<html>
  <head>
    <title>502 - Bad Gateway</title>
  </head>
  <body>
    <h1>502 - Bad Gateway</h1>
    <p>An error occurred while retrieving the page. Please check the server log for details.
  </body>
</html>"#;

/// Headers that describe the origin connection rather than the resource.
const UNCOPIED_HEADERS: [HeaderName; 9] = [
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    SET_COOKIE,
];

/// Buffered origin response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Send `request` and buffer the whole response.
    pub async fn fetch(client: &reqwest::Client, request: OutboundRequest) -> Result<Self> {
        let response = request.into_reqwest(client).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Body decoded with the `Content-Type` charset, UTF-8 when absent or
    /// unknown. A byte order mark wins over the label.
    pub fn text(&self) -> String {
        let encoding = self
            .content_type()
            .and_then(charset_label)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8);
        let (text, _, _) = encoding.decode(&self.body);
        text.into_owned()
    }

    /// Origin headers that may be forwarded to the client as-is.
    pub fn end_to_end_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        for name in UNCOPIED_HEADERS.iter() {
            headers.remove(name);
        }
        headers
    }
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim_matches('\'');
        (!value.is_empty()).then_some(value)
    })
}

/// Build a client response with an explicit content type.
pub fn with_content_type(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// The uniform failure response.
pub fn bad_gateway() -> Response {
    with_content_type(StatusCode::BAD_GATEWAY, "text/html", BAD_GATEWAY_HTML)
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        bad_gateway()
    }
}
