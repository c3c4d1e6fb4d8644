//! Response transformation subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse (status, content-type)
//!     → classify()  → ResponseKind
//!     → respond()   (single exhaustive dispatch)
//!         Redirect    → redirect.rs (downgrade Location, learn forceSecure)
//!         Html        → html.rs (strip, size, repair, minify)
//!         Css         → css.rs (minify)
//!         Image       → raster.rs (shrink + JPEG, on a blocking thread)
//!         Passthrough → copy
//!     → Set-Cookie policy applied to every path
//! ```
//!
//! # Design Decisions
//! - Classification happens once; no transform re-inspects the content type
//! - Every request recomputes its transform; nothing is cached across requests

pub mod css;
pub mod html;
pub mod raster;
pub mod probe;
pub mod redirect;

use axum::body::{Body, Bytes};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use url::Url;

use crate::config::TransformConfig;
use crate::error::{ProxyError, Result};
use crate::http::cookies::CookiePolicy;
use crate::http::response::{with_content_type, UpstreamResponse};
use crate::policy::{HostPolicyStore, Trust};

pub use html::HtmlOptions;
pub use probe::{HttpImageProber, ImageProber, ImageSize, ImageSizeCache};

/// Transform path selected for one upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Redirect,
    Html,
    Css,
    /// Raster image to shrink to at most `max_width` pixels.
    Image { max_width: u32 },
    Passthrough,
}

impl ResponseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Redirect => "redirect",
            ResponseKind::Html => "html",
            ResponseKind::Css => "css",
            ResponseKind::Image { .. } => "image",
            ResponseKind::Passthrough => "passthrough",
        }
    }
}

/// Pick the transform path for a response.
///
/// Images are only transformed for hostile hosts and only when a maximum
/// source width is configured. XML-based image types (SVG) pass through.
pub fn classify(
    status: StatusCode,
    content_type: Option<&str>,
    trust: Trust,
    max_source_width: Option<u32>,
) -> Result<ResponseKind> {
    if status.is_redirection() {
        return Ok(ResponseKind::Redirect);
    }

    let content_type = content_type
        .ok_or(ProxyError::ContentTypeMissing)?
        .to_ascii_lowercase();

    let kind = if content_type.starts_with("text/html") {
        ResponseKind::Html
    } else if content_type.starts_with("text/css") {
        ResponseKind::Css
    } else {
        match max_source_width {
            Some(max_width)
                if trust.is_hostile()
                    && content_type.starts_with("image/")
                    && !content_type.contains("xml") =>
            {
                ResponseKind::Image { max_width }
            }
            _ => ResponseKind::Passthrough,
        }
    };
    Ok(kind)
}

/// Per-request inputs shared by every transform path.
pub struct TransformContext<'a, P: ?Sized> {
    /// URL the client asked for (before any scheme upgrade).
    pub request_url: &'a Url,
    /// Requesting hostname.
    pub host: &'a str,
    pub trust: Trust,
    pub settings: &'a TransformConfig,
    pub policy: &'a HostPolicyStore,
    pub prober: &'a P,
}

/// Classify `upstream` and produce the client response.
pub async fn respond<P>(
    cx: &TransformContext<'_, P>,
    upstream: UpstreamResponse,
) -> Result<(ResponseKind, Response)>
where
    P: ImageProber + ?Sized,
{
    let kind = classify(
        upstream.status,
        upstream.content_type(),
        cx.trust,
        cx.settings.max_source_width,
    )?;

    let mut response = match kind {
        ResponseKind::Redirect => {
            let location = upstream.location();
            tracing::info!(
                status = %upstream.status,
                url = %cx.request_url,
                location = ?location,
                "redirect"
            );
            let outcome =
                redirect::rewrite_redirect(cx.policy, cx.host, cx.request_url, location);

            let mut headers = upstream.end_to_end_headers();
            headers.remove(LOCATION);
            if let Some(location) = outcome.location {
                headers.insert(LOCATION, location);
            }
            with_headers(upstream.status, headers, upstream.body.clone())
        }
        ResponseKind::Html => {
            let options = HtmlOptions {
                trust: cx.trust,
                strip_js: cx.settings.strip_js,
                strip_css: cx.settings.strip_css,
                max_inline_width: cx.settings.max_inline_width,
            };
            let html = html::transform_html(
                &upstream.text(),
                cx.request_url,
                &options,
                cx.policy,
                cx.prober,
            )
            .await?;
            if cx.trust.is_hostile() {
                tracing::info!(status = %upstream.status, url = %cx.request_url, "html minified");
            }
            with_content_type(upstream.status, "text/html", html)
        }
        ResponseKind::Css => {
            let css = css::minify_css_or_original(&upstream.text());
            tracing::info!(url = %cx.request_url, "css minified");
            with_content_type(upstream.status, "text/css", css)
        }
        ResponseKind::Image { max_width } => {
            let body = upstream.body.clone();
            let jpeg =
                tokio::task::spawn_blocking(move || raster::shrink_to_jpeg(&body, max_width))
                    .await??;
            tracing::info!(
                content_type = ?upstream.content_type(),
                url = %cx.request_url,
                "image minified"
            );
            with_content_type(upstream.status, "image/jpeg", jpeg)
        }
        ResponseKind::Passthrough => with_headers(
            upstream.status,
            upstream.end_to_end_headers(),
            upstream.body.clone(),
        ),
    };

    CookiePolicy::new(cx.settings.block_cookies).inbound(&upstream.headers, response.headers_mut());
    Ok((kind, response))
}

fn with_headers(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
