//! Hosts inferred to require secure transport.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use url::Url;

use crate::observability::metrics;

/// Process-wide record of hostnames that silently demand HTTPS.
///
/// Handles are cheap to clone and all clones share the same map. Inserts
/// are idempotent, so two requests racing on the same newly-discovered host
/// both succeed and leave a single entry. A reader that races the very first
/// insert for a host may miss it; that request goes out over plain HTTP and
/// the next one is upgraded.
#[derive(Clone, Debug, Default)]
pub struct HostPolicyStore {
    inner: Arc<DashMap<String, bool>>,
}

impl HostPolicyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `host` (or a host it is a suffix-match of) is marked forceSecure.
    pub fn is_force_secure(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.inner
            .iter()
            .any(|entry| *entry.value() && host.ends_with(entry.key().as_str()))
    }

    /// Record `host` as forceSecure.
    ///
    /// Returns `true` when this call created or flipped the entry.
    pub fn mark_force_secure(&self, host: &str) -> bool {
        match self.inner.entry(host.to_ascii_lowercase()) {
            Entry::Occupied(mut entry) => {
                let changed = !*entry.get();
                *entry.get_mut() = true;
                changed
            }
            Entry::Vacant(entry) => {
                entry.insert(true);
                metrics::record_force_secure_host();
                true
            }
        }
    }

    /// Rewrite `url` to HTTPS when its host is marked forceSecure.
    pub fn upgrade(&self, url: &Url) -> Url {
        match url.host_str() {
            Some(host) if self.is_force_secure(host) => upgrade_scheme(url),
            _ => url.clone(),
        }
    }

    /// Sorted snapshot of the recorded hostnames.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .inner
            .iter()
            .filter(|entry| *entry.value())
            .map(|entry| entry.key().clone())
            .collect();
        hosts.sort();
        hosts
    }

    /// Number of recorded hostnames.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// `http:` → `https:`; any other scheme is left alone.
pub fn upgrade_scheme(url: &Url) -> Url {
    let mut upgraded = url.clone();
    if upgraded.scheme() == "http" {
        // http and https are both special schemes, so this cannot fail
        let _ = upgraded.set_scheme("https");
    }
    upgraded
}

/// Rewrite a leading `https:` in a raw `Location` value to `http:`.
pub fn downgrade_location(location: &str) -> String {
    match location.strip_prefix("https:") {
        Some(rest) => format!("http:{}", rest),
        None => location.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_upgrades_nothing() {
        let store = HostPolicyStore::new();
        let url = Url::parse("http://a.example/page").unwrap();
        assert!(!store.is_force_secure("a.example"));
        assert_eq!(store.upgrade(&url), url);
    }

    #[test]
    fn test_marked_host_and_subdomains_upgrade() {
        let store = HostPolicyStore::new();
        assert!(store.mark_force_secure("B.Example"));

        assert!(store.is_force_secure("b.example"));
        assert!(store.is_force_secure("www.b.example"));
        assert!(!store.is_force_secure("c.example"));

        let url = Url::parse("http://www.b.example/x?q=1").unwrap();
        assert_eq!(store.upgrade(&url).as_str(), "https://www.b.example/x?q=1");
    }

    #[test]
    fn test_mark_is_idempotent() {
        let store = HostPolicyStore::new();
        assert!(store.mark_force_secure("b.example"));
        assert!(!store.mark_force_secure("b.example"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.hosts(), vec!["b.example".to_string()]);
    }

    #[test]
    fn test_clones_share_state() {
        let store = HostPolicyStore::new();
        let handle = store.clone();
        handle.mark_force_secure("b.example");
        assert!(store.is_force_secure("b.example"));
    }

    #[test]
    fn test_concurrent_marks_leave_one_entry() {
        let store = HostPolicyStore::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.mark_force_secure("race.example");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(store.hosts(), vec!["race.example".to_string()]);
    }

    #[test]
    fn test_scheme_helpers() {
        let url = Url::parse("http://a.example:8080/p").unwrap();
        assert_eq!(upgrade_scheme(&url).as_str(), "https://a.example:8080/p");

        let ftp = Url::parse("ftp://a.example/p").unwrap();
        assert_eq!(upgrade_scheme(&ftp), ftp);

        assert_eq!(downgrade_location("https://b.example/x"), "http://b.example/x");
        assert_eq!(downgrade_location("/relative"), "/relative");
        assert_eq!(downgrade_location("http://b.example/"), "http://b.example/");
    }
}
