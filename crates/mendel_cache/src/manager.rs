//! Cross-environment cache registry and synchronization.

use mendel_common::Lifecycle;
use std::collections::BTreeSet;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::cache::MendelCache;
use crate::entry::EntryState;
use crate::error::CacheError;
use crate::event::CacheEvent;

/// Outcome of [`CacheManager::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Ids copied as done from a sibling cache.
    pub copied: usize,
    /// Ids added as requested because no sibling had finished them.
    pub requested: usize,
    /// Watched ids held by no other cache.
    pub orphaned: usize,
}

/// Owns every environment cache and the set of watched file ids.
///
/// Caches are kept in registration order, which decides which sibling a
/// [`sync`](CacheManager::sync) copies from. Events of every cache are
/// republished to manager-wide subscribers, tagged with their environment.
#[derive(Debug, Default)]
pub struct CacheManager {
    caches: Vec<MendelCache>,
    watched: BTreeSet<String>,
    listeners: Vec<UnboundedSender<CacheEvent>>,
}

impl CacheManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache and attaches every manager-wide listener to it.
    pub fn add_cache(&mut self, mut cache: MendelCache) -> Result<(), CacheError> {
        if self.index_of(cache.environment()).is_some() {
            return Err(CacheError::DuplicateEnvironment {
                environment: cache.environment().to_string(),
            });
        }
        for listener in &self.listeners {
            cache.add_listener(listener.clone());
        }
        debug!(environment = cache.environment(), "cache registered");
        self.caches.push(cache);
        Ok(())
    }

    /// Returns a receiver for the events of every current and future cache.
    pub fn subscribe(&mut self) -> UnboundedReceiver<CacheEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for cache in &mut self.caches {
            cache.add_listener(tx.clone());
        }
        self.listeners.push(tx);
        rx
    }

    /// Brings the cache of `environment` up to date with the watched ids.
    ///
    /// Each missing id is looked up in the other caches in registration
    /// order. A done entry is copied over; an entry still in flight is added
    /// as requested so this environment builds it itself. Ids no other cache
    /// holds are left alone and stay watched.
    pub fn sync(&mut self, environment: &str) -> Result<SyncReport, CacheError> {
        let dest = self
            .index_of(environment)
            .ok_or_else(|| CacheError::UnknownEnvironment {
                environment: environment.to_string(),
            })?;
        let mut report = SyncReport::default();

        let missing: Vec<String> = self
            .watched
            .iter()
            .filter(|id| !self.caches[dest].has_entry(id))
            .cloned()
            .collect();

        for id in missing {
            let source = self
                .caches
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != dest)
                .find_map(|(_, cache)| cache.get_entry(&id).ok());
            let Some(source) = source else {
                report.orphaned += 1;
                continue;
            };
            if source.state == EntryState::Done {
                let raw_source = source.raw_source.clone().unwrap_or_default();
                let raw_deps = source.raw_deps.clone();
                let map = source.map.clone();
                let cache = &mut self.caches[dest];
                cache.add_entry(&id);
                cache.set_source(&id, raw_source, raw_deps, map)?;
                report.copied += 1;
            } else {
                self.caches[dest].add_entry(&id);
                report.requested += 1;
            }
        }

        info!(
            environment,
            copied = report.copied,
            requested = report.requested,
            orphaned = report.orphaned,
            "cache synced"
        );
        Ok(report)
    }

    /// Watches `id` and adds it to every cache.
    pub fn add_entry(&mut self, id: &str) {
        self.watched.insert(id.to_string());
        for cache in &mut self.caches {
            cache.add_entry(id);
        }
    }

    /// Stops watching `id` and removes it from every cache.
    pub fn remove_entry(&mut self, id: &str) {
        self.watched.remove(id);
        for cache in &mut self.caches {
            cache.remove_entry(id);
        }
    }

    /// Requests a rebuild of `id` in every cache.
    pub fn entry_changed(&mut self, id: &str) {
        self.watched.insert(id.to_string());
        for cache in &mut self.caches {
            cache.entry_changed(id);
        }
    }

    /// Whether any cache holds `id`.
    pub fn has_entry(&self, id: &str) -> bool {
        self.caches.iter().any(|c| c.has_entry(id))
    }

    /// The cache of `environment`, if registered.
    pub fn cache(&self, environment: &str) -> Option<&MendelCache> {
        self.caches.iter().find(|c| c.environment() == environment)
    }

    /// Mutable access to the cache of `environment`, if registered.
    pub fn cache_mut(&mut self, environment: &str) -> Option<&mut MendelCache> {
        self.caches
            .iter_mut()
            .find(|c| c.environment() == environment)
    }

    /// Registered environments in registration order.
    pub fn environments(&self) -> Vec<&str> {
        self.caches.iter().map(MendelCache::environment).collect()
    }

    /// Every watched id, sorted.
    pub fn watched_ids(&self) -> &BTreeSet<String> {
        &self.watched
    }

    fn index_of(&self, environment: &str) -> Option<usize> {
        self.caches
            .iter()
            .position(|c| c.environment() == environment)
    }
}

impl Lifecycle for CacheManager {
    fn name(&self) -> &'static str {
        "cache manager"
    }

    fn on_exit(&self) {
        for cache in &self.caches {
            info!(
                environment = cache.environment(),
                entries = cache.len(),
                done = cache.count(EntryState::Done),
                errored = cache.count(EntryState::Errored),
                "cache closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::config;
    use std::collections::BTreeMap;

    const X: &str = "./src/base/x.js";

    fn cache(env: &str) -> MendelCache {
        MendelCache::new(config(env))
    }

    #[test]
    fn sync_copies_done_entries() {
        let mut manager = CacheManager::new();
        manager.add_cache(cache("development")).unwrap();
        manager.add_entry(X);
        manager
            .cache_mut("development")
            .unwrap()
            .set_source(X, "S".into(), BTreeMap::new(), Some("map".into()))
            .unwrap();

        manager.add_cache(cache("production")).unwrap();
        let report = manager.sync("production").unwrap();
        assert_eq!(report.copied, 1);

        let entry = manager.cache("production").unwrap().get_entry(X).unwrap();
        assert_eq!(entry.state, EntryState::Done);
        assert_eq!(entry.raw_source.as_deref(), Some("S"));
        assert_eq!(entry.map.as_deref(), Some("map"));
    }

    #[test]
    fn sync_requests_unfinished_entries() {
        let mut manager = CacheManager::new();
        manager.add_cache(cache("development")).unwrap();
        manager.add_entry(X);
        manager.add_cache(cache("production")).unwrap();

        let report = manager.sync("production").unwrap();
        assert_eq!(report.requested, 1);
        let entry = manager.cache("production").unwrap().get_entry(X).unwrap();
        assert_eq!(entry.state, EntryState::Requested);
    }

    #[test]
    fn sync_of_orphan_is_noop() {
        let mut manager = CacheManager::new();
        manager.add_cache(cache("development")).unwrap();
        manager.add_entry(X);
        manager.cache_mut("development").unwrap().remove_entry(X);

        manager.add_cache(cache("production")).unwrap();
        let report = manager.sync("production").unwrap();
        assert_eq!(report.orphaned, 1);
        assert!(!manager.cache("production").unwrap().has_entry(X));
        assert!(manager.watched_ids().contains(X));
    }

    #[test]
    fn first_registered_sibling_wins() {
        let mut manager = CacheManager::new();
        manager.add_cache(cache("development")).unwrap();
        manager.add_cache(cache("test")).unwrap();
        manager.add_entry(X);
        manager
            .cache_mut("development")
            .unwrap()
            .set_source(X, "from development".into(), BTreeMap::new(), None)
            .unwrap();
        manager
            .cache_mut("test")
            .unwrap()
            .set_source(X, "from test".into(), BTreeMap::new(), None)
            .unwrap();

        manager.add_cache(cache("production")).unwrap();
        manager.sync("production").unwrap();
        let entry = manager.cache("production").unwrap().get_entry(X).unwrap();
        assert_eq!(entry.raw_source.as_deref(), Some("from development"));
    }

    #[test]
    fn fan_out_and_republish() {
        let mut manager = CacheManager::new();
        let mut rx = manager.subscribe();
        manager.add_cache(cache("development")).unwrap();
        manager.add_cache(cache("production")).unwrap();

        manager.add_entry(X);
        assert!(manager.has_entry(X));
        let mut envs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.kind(), "entryRequested");
            envs.push(event.environment().to_string());
        }
        assert_eq!(envs, vec!["development", "production"]);

        manager.entry_changed(X);
        manager.remove_entry(X);
        assert!(!manager.has_entry(X));
        assert!(manager.watched_ids().is_empty());
        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            kinds,
            vec!["entryChanged", "entryChanged", "entryRemoved", "entryRemoved"]
        );
    }

    #[test]
    fn duplicate_and_unknown_environment() {
        let mut manager = CacheManager::new();
        manager.add_cache(cache("development")).unwrap();
        let err = manager.add_cache(cache("development")).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateEnvironment { .. }));
        let err = manager.sync("staging").unwrap_err();
        assert!(matches!(err, CacheError::UnknownEnvironment { .. }));
        assert_eq!(manager.environments(), vec!["development"]);
    }
}
