//! Validated settings cache
//!
//! Remembers the outcome of the last fully successful probe of each upstream so
//! that later passes with the same spec generation and bind secret version can
//! skip the network round trips.

use crate::condition::Condition;
use crate::provider::ConnectionProtocol;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Settings resolved by a successful validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSettings {
    pub upstream_name: String,
    pub idp_spec_generation: i64,
    pub bind_secret_resource_version: String,
    pub connection_protocol: ConnectionProtocol,
    pub user_search_base: String,
    pub group_search_base: String,
    pub connection_valid_condition: Condition,
    pub search_base_found_condition: Option<Condition>,
}

impl ValidatedSettings {
    /// Both search bases were resolved
    pub fn is_complete(&self) -> bool {
        !self.user_search_base.is_empty() && !self.group_search_base.is_empty()
    }
}

/// Cache of validated settings, keyed by upstream name
pub trait ValidatedSettingsCache: Send + Sync {
    /// Hit only when name, secret version and generation all match and the
    /// stored settings are complete
    fn get(
        &self,
        name: &str,
        bind_secret_resource_version: &str,
        generation: i64,
    ) -> Option<ValidatedSettings>;

    /// Replace whatever is stored for `name`
    fn set(&self, name: &str, settings: ValidatedSettings);
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Process-wide concurrent settings cache
#[derive(Debug, Default)]
pub struct SettingsCache {
    entries: DashMap<String, ValidatedSettings>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl ValidatedSettingsCache for SettingsCache {
    fn get(
        &self,
        name: &str,
        bind_secret_resource_version: &str,
        generation: i64,
    ) -> Option<ValidatedSettings> {
        let found = self.entries.get(name).and_then(|entry| {
            let settings = entry.value();
            (settings.idp_spec_generation == generation
                && settings.bind_secret_resource_version == bind_secret_resource_version
                && settings.is_complete())
                .then(|| settings.clone())
        });

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn set(&self, name: &str, settings: ValidatedSettings) {
        self.entries.insert(name.to_string(), settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{REASON_SUCCESS, TYPE_LDAP_CONNECTION_VALID};
    use std::sync::Arc;

    fn settings(name: &str, generation: i64, version: &str) -> ValidatedSettings {
        ValidatedSettings {
            upstream_name: name.to_string(),
            idp_spec_generation: generation,
            bind_secret_resource_version: version.to_string(),
            connection_protocol: ConnectionProtocol::StartTls,
            user_search_base: "ou=users,dc=example,dc=com".to_string(),
            group_search_base: "ou=groups,dc=example,dc=com".to_string(),
            connection_valid_condition: Condition::success(
                TYPE_LDAP_CONNECTION_VALID,
                REASON_SUCCESS,
                "ok",
            ),
            search_base_found_condition: None,
        }
    }

    #[test]
    fn test_exact_match_required() {
        let cache = SettingsCache::new();
        cache.set("idp1", settings("idp1", 5, "v1"));

        assert!(cache.get("idp1", "v1", 5).is_some());
        assert!(cache.get("idp1", "v2", 5).is_none());
        assert!(cache.get("idp1", "v1", 6).is_none());
        assert!(cache.get("idp2", "v1", 5).is_none());

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
    }

    #[test]
    fn test_set_overwrites_wholesale() {
        let cache = SettingsCache::new();
        cache.set("idp1", settings("idp1", 5, "v1"));
        let mut newer = settings("idp1", 6, "v1");
        newer.connection_protocol = ConnectionProtocol::Tls;
        cache.set("idp1", newer.clone());

        assert!(cache.get("idp1", "v1", 5).is_none());
        assert_eq!(cache.get("idp1", "v1", 6), Some(newer));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_completeness() {
        let mut entry = settings("idp1", 1, "v1");
        assert!(entry.is_complete());
        entry.group_search_base.clear();
        assert!(!entry.is_complete());
    }

    #[test]
    fn test_incomplete_entry_counts_as_miss() {
        let cache = SettingsCache::new();
        let mut entry = settings("idp1", 1, "v1");
        entry.user_search_base.clear();
        cache.set("idp1", entry);

        assert!(cache.get("idp1", "v1", 1).is_none());
        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(SettingsCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let name = format!("idp{}", i);
                    for generation in 0..50 {
                        cache.set(&name, settings(&name, generation, "v1"));
                        assert!(cache.get(&name, "v1", generation).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
    }
}
