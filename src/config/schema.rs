//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address and port).
    pub listener: ListenerConfig,

    /// Content transformation switches.
    pub transform: TransformConfig,

    /// Allow-list of friendly host suffixes.
    pub allow_list: AllowListConfig,

    /// Timeout configuration for origin requests.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Inbound request limits.
    pub security: SecurityConfig,
}

impl ProxyConfig {
    /// Address the listener binds to. Call after validation.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let ip: IpAddr = self.listener.bind_address.parse().ok()?;
        Some(SocketAddr::new(ip, self.listener.port))
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind IP (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Bind port.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Content transformation switches. Stripping and minification only ever
/// apply to hostile hosts.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransformConfig {
    /// Remove scripts and unwrap `<noscript>`.
    pub strip_js: bool,

    /// Remove stylesheets and `class`/`style` attributes.
    pub strip_css: bool,

    /// Never forward cookies in either direction.
    pub block_cookies: bool,

    /// Recompress raster images no wider than this. Unset disables image minification.
    pub max_source_width: Option<u32>,

    /// Clamp `<img>` width/height attributes to this width.
    pub max_inline_width: Option<u32>,
}

/// Allow-list source.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AllowListConfig {
    /// File with one hostname suffix per line.
    pub path: Option<PathBuf>,
}

/// Timeout configuration for origin requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time for one origin request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Inbound request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
