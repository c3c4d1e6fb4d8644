//! Allow-list and trust classification.
//!
//! # Responsibilities
//! - Load the allow-list file once at startup
//! - Classify a requesting hostname as friendly or hostile
//!
//! # Design Decisions
//! - Suffix match, not exact match: `www.example.com` matches `example.com`
//! - A missing or unreadable file degrades to an empty list (everyone hostile)

use std::fs;
use std::path::Path;

use crate::error::{ProxyError, Result};

/// Whether a host is exempt from stripping and minification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    Friendly,
    Hostile,
}

impl Trust {
    pub fn is_friendly(self) -> bool {
        matches!(self, Trust::Friendly)
    }

    pub fn is_hostile(self) -> bool {
        matches!(self, Trust::Hostile)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trust::Friendly => "friendly",
            Trust::Hostile => "hostile",
        }
    }
}

/// Immutable set of hostname suffixes.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    suffixes: Vec<String>,
}

impl AllowList {
    /// Build from an ordered list of suffixes. Blank entries are dropped.
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Parse the file format: one suffix per line, `#` starts a comment line.
    pub fn parse(input: &str) -> Self {
        Self::new(
            input
                .lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    /// Read and parse an allow-list file.
    pub fn load(path: &Path) -> Result<Self> {
        let input = fs::read_to_string(path).map_err(|source| ProxyError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&input))
    }

    /// Load the allow-list, falling back to an empty one on any failure.
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::warn!("No allow-list configured, every host is hostile");
            return Self::default();
        };

        match Self::load(path) {
            Ok(list) => {
                tracing::info!(suffixes = ?list.suffixes, "Allow-list loaded");
                list
            }
            Err(e) => {
                tracing::error!(error = %e, "Allow-list unavailable, every host is hostile");
                Self::default()
            }
        }
    }

    /// Classify a requesting hostname.
    pub fn classify(&self, host: &str) -> Trust {
        let host = host.to_ascii_lowercase();
        if self.suffixes.iter().any(|suffix| host.ends_with(suffix.as_str())) {
            Trust::Friendly
        } else {
            Trust::Hostile
        }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}
