//! Inline image dimension probing.

use std::collections::HashMap;
use std::io::Cursor;

use async_trait::async_trait;
use futures_util::future::join_all;
use url::Url;

use crate::error::{ProxyError, Result};
use crate::observability::metrics;
use crate::policy::HostPolicyStore;

/// Pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Source of image dimensions for `<img>` sizing.
#[async_trait]
pub trait ImageProber: Send + Sync {
    async fn probe(&self, url: &Url) -> Result<ImageSize>;
}

/// Probes by downloading the image and reading its header.
#[derive(Clone)]
pub struct HttpImageProber {
    client: reqwest::Client,
    policy: HostPolicyStore,
}

impl HttpImageProber {
    pub fn new(client: reqwest::Client, policy: HostPolicyStore) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl ImageProber for HttpImageProber {
    async fn probe(&self, url: &Url) -> Result<ImageSize> {
        let target = self.policy.upgrade(url);
        let probe_error = |reason: String| ProxyError::ImageProbe {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| probe_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(probe_error(format!("status {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| probe_error(e.to_string()))?;

        let (width, height) = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| probe_error(e.to_string()))?
            .into_dimensions()
            .map_err(|e| probe_error(e.to_string()))?;
        Ok(ImageSize { width, height })
    }
}

/// Per-document memo of probed sizes, keyed by absolute image URL.
#[derive(Debug, Default, Clone)]
pub struct ImageSizeCache {
    sizes: HashMap<String, ImageSize>,
}

impl ImageSizeCache {
    /// Probe every distinct URL once. Failures are logged and left out.
    pub async fn probe_all<P: ImageProber + ?Sized>(prober: &P, urls: &[Url]) -> Self {
        let mut unique: Vec<&Url> = Vec::new();
        for url in urls {
            if !unique.iter().any(|seen| seen.as_str() == url.as_str()) {
                unique.push(url);
            }
        }

        let results = join_all(unique.iter().map(|url| prober.probe(url))).await;

        let mut sizes = HashMap::new();
        for (url, result) in unique.into_iter().zip(results) {
            match result {
                Ok(size) => {
                    sizes.insert(url.to_string(), size);
                }
                Err(e) => {
                    metrics::record_probe_failure();
                    tracing::warn!(error = %e, "Unable to resize image");
                }
            }
        }
        Self { sizes }
    }

    pub fn get(&self, url: &str) -> Option<ImageSize> {
        self.sizes.get(url).copied()
    }

    pub fn insert(&mut self, url: impl Into<String>, size: ImageSize) {
        self.sizes.insert(url.into(), size);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}
