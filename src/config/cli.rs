//! Command-line and environment overrides.
//!
//! Every flag also reads the environment variable deployments already use,
//! so `NO_JS=1 RESIZE_TO=320 legacy-proxy` keeps working.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ProxyConfig;

#[derive(Debug, Parser)]
#[command(name = "legacy-proxy")]
#[command(about = "HTTP proxy that slims pages down for legacy browsers", long_about = None)]
pub struct Cli {
    /// TOML configuration file. Flags below override its values.
    #[arg(short, long, env = "PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind IP address.
    #[arg(long, env = "IP")]
    pub ip: Option<String>,

    /// Bind port.
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// File listing friendly hostname suffixes, one per line.
    #[arg(long, env = "ALLOWLIST")]
    pub allowlist: Option<PathBuf>,

    /// Strip scripts from hostile pages.
    #[arg(long, env = "NO_JS", num_args = 0..=1, default_missing_value = "1", value_parser = parse_switch)]
    pub no_js: Option<bool>,

    /// Strip stylesheets from hostile pages.
    #[arg(long, env = "NO_CSS", num_args = 0..=1, default_missing_value = "1", value_parser = parse_switch)]
    pub no_css: Option<bool>,

    /// Never forward cookies.
    #[arg(long, env = "NO_COOKIES", num_args = 0..=1, default_missing_value = "1", value_parser = parse_switch)]
    pub no_cookies: Option<bool>,

    /// Recompress hostile images to at most this many pixels wide.
    #[arg(long, env = "RESIZE_TO")]
    pub resize_to: Option<u32>,

    /// Clamp inline image sizes to this width.
    #[arg(long, env = "SCALE_TO")]
    pub scale_to: Option<u32>,

    /// Log level when RUST_LOG is unset.
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Any non-empty value turns a switch on, matching how the variables were always read.
fn parse_switch(value: &str) -> Result<bool, String> {
    Ok(!value.is_empty())
}

impl Cli {
    /// Load the configured file (or defaults) and apply overrides.
    ///
    /// The result is not re-validated; callers run `validate_config` once
    /// logging is up.
    pub fn resolve(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Overlay the explicitly given values onto `config`.
    pub fn apply(&self, config: &mut ProxyConfig) {
        if let Some(ip) = &self.ip {
            config.listener.bind_address = ip.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(path) = &self.allowlist {
            config.allow_list.path = Some(path.clone());
        }
        if let Some(on) = self.no_js {
            config.transform.strip_js = on;
        }
        if let Some(on) = self.no_css {
            config.transform.strip_css = on;
        }
        if let Some(on) = self.no_cookies {
            config.transform.block_cookies = on;
        }
        if let Some(width) = self.resize_to {
            config.transform.max_source_width = Some(width);
        }
        if let Some(width) = self.scale_to {
            config.transform.max_inline_width = Some(width);
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}
