//! Redirect rewriting and forced-HTTPS discovery.
//!
//! An origin that answers `http://host/path` with a redirect to exactly
//! `https://host/path` is assumed to demand HTTPS for the whole host. The
//! heuristic trusts a single match: a coincidental scheme-only redirect is a
//! false positive and a relative `Location` is a false negative.

use axum::http::HeaderValue;
use url::Url;

use crate::policy::{downgrade_location, upgrade_scheme, HostPolicyStore};

/// Outcome of inspecting one redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    /// `Location` to hand the client, if the origin sent one.
    pub location: Option<HeaderValue>,
    /// Whether this redirect recorded `host` as forceSecure.
    pub learned_force_secure: bool,
}

/// Inspect a redirect for forced HTTPS and downgrade its target.
pub fn rewrite_redirect(
    policy: &HostPolicyStore,
    host: &str,
    request_url: &Url,
    location: Option<&str>,
) -> RedirectOutcome {
    let Some(location) = location else {
        return RedirectOutcome {
            location: None,
            learned_force_secure: false,
        };
    };

    let mut learned_force_secure = false;
    if !policy.is_force_secure(host) && upgrade_scheme(request_url).as_str() == location {
        learned_force_secure = policy.mark_force_secure(host);
        if learned_force_secure {
            tracing::info!(host = %host, "Forcing HTTPS for hostname");
        }
    }

    let downgraded = downgrade_location(location);
    let location = match HeaderValue::from_str(&downgraded) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(location = %downgraded, error = %e, "Dropping invalid Location");
            None
        }
    };

    RedirectOutcome {
        location,
        learned_force_secure,
    }
}
