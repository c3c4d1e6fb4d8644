//! Error taxonomy for the request pipeline.
//!
//! Every per-request failure surfaces as a [`ProxyError`]. The request
//! boundary turns any of them into the same 502 page; the non-fatal kinds
//! (`ConfigLoad`, `ImageProbe`, `MinifyParse`) are logged and absorbed by
//! their callers instead of being propagated.

use std::path::PathBuf;

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The allow-list file could not be read.
    #[error("failed to load allow-list from {}: {source}", path.display())]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network, DNS or timeout failure while talking to the origin.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[from] reqwest::Error),

    /// A non-redirect upstream response carried no content-type.
    #[error("upstream response has no content-type")]
    ContentTypeMissing,

    /// Dimensions of an inline image could not be determined.
    #[error("unable to probe image {url}: {reason}")]
    ImageProbe { url: String, reason: String },

    /// A raster image could not be decoded or re-encoded.
    #[error("image transform failed: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The minifier rejected its input.
    #[error("minification failed: {0}")]
    MinifyParse(String),

    /// The HTML rewriter aborted.
    #[error("HTML rewrite failed: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),

    /// The inbound request could not be turned into an origin request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A blocking worker died before returning.
    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
