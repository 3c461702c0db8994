//! The per-environment module cache.

use mendel_config::EnvironmentConfig;
use mendel_core::{BundleGraph, ModuleVariant};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::entry::{Dependency, Entry, EntryState};
use crate::error::CacheError;
use crate::event::CacheEvent;

/// In-memory cache of build entries for one environment.
///
/// Every state change is published as a [`CacheEvent`] to all listeners.
/// Listeners whose receiver was dropped are pruned on the next event.
pub struct MendelCache {
    environment: Arc<str>,
    config: Arc<EnvironmentConfig>,
    entries: HashMap<String, Entry>,
    listeners: Vec<UnboundedSender<CacheEvent>>,
}

impl MendelCache {
    /// Creates an empty cache for the environment described by `config`.
    pub fn new(config: Arc<EnvironmentConfig>) -> Self {
        Self {
            environment: Arc::from(config.name.as_str()),
            config,
            entries: HashMap::new(),
            listeners: Vec::new(),
        }
    }

    /// The environment tag of this cache.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The environment configuration used to classify entries.
    pub fn config(&self) -> &Arc<EnvironmentConfig> {
        &self.config
    }

    /// Returns a receiver for every future event of this cache.
    pub fn subscribe(&mut self) -> UnboundedReceiver<CacheEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    /// Attaches an existing sender as a listener.
    pub fn add_listener(&mut self, listener: UnboundedSender<CacheEvent>) {
        self.listeners.push(listener);
    }

    /// Creates a requested entry if `id` is absent. Returns whether it was created.
    pub fn add_entry(&mut self, id: &str) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        let class = self.config.classify(id);
        let is_entry = self.config.is_entry(&class.normalized_id);
        self.entries
            .insert(id.to_string(), Entry::new(id, class, is_entry));
        debug!(environment = %self.environment, id, "entry requested");
        self.emit(CacheEvent::EntryRequested {
            environment: self.environment.clone(),
            id: id.to_string(),
        });
        true
    }

    /// Records a finished build and marks the entry done.
    ///
    /// `DoneEntry` is emitted even when the source is unchanged, since
    /// listeners saw the entry leave on `EntryChanged`.
    pub fn set_source(
        &mut self,
        id: &str,
        raw_source: String,
        raw_deps: BTreeMap<String, Dependency>,
        map: Option<String>,
    ) -> Result<(), CacheError> {
        let entry = self.entry_mut(id)?;
        let changed = entry.set_source(raw_source, raw_deps, map);
        debug!(environment = %self.environment, id, changed, "entry done");
        self.emit(CacheEvent::DoneEntry {
            environment: self.environment.clone(),
            id: id.to_string(),
        });
        Ok(())
    }

    /// Marks the entry as failed. It is not retried until the file changes.
    pub fn set_errored(&mut self, id: &str, message: impl Into<String>) -> Result<(), CacheError> {
        let message = message.into();
        self.entry_mut(id)?.set_errored(message.clone());
        self.emit(CacheEvent::EntryErrored {
            environment: self.environment.clone(),
            id: id.to_string(),
            message,
        });
        Ok(())
    }

    /// Requests a rebuild after a file change; adds the entry if absent.
    pub fn entry_changed(&mut self, id: &str) {
        match self.entries.get_mut(id) {
            Some(entry) => entry.reset(),
            None => {
                self.add_entry(id);
                return;
            }
        }
        self.emit(CacheEvent::EntryChanged {
            environment: self.environment.clone(),
            id: id.to_string(),
        });
    }

    /// Deletes an entry. Returns whether it existed.
    pub fn remove_entry(&mut self, id: &str) -> bool {
        if self.entries.remove(id).is_none() {
            return false;
        }
        self.emit(CacheEvent::EntryRemoved {
            environment: self.environment.clone(),
            id: id.to_string(),
        });
        true
    }

    /// Whether an entry exists for `id`.
    pub fn has_entry(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the entry for `id`.
    pub fn get_entry(&self, id: &str) -> Result<&Entry, CacheError> {
        self.entries.get(id).ok_or_else(|| self.not_found(id))
    }

    /// All entries sorted by id.
    pub fn entries(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Ids of entries waiting to be built, sorted.
    pub fn requested_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.state == EntryState::Requested)
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of entries in `state`.
    pub fn count(&self, state: EntryState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the bundle graph of every done entry.
    ///
    /// Variants are added in id order so branch indices are stable for an
    /// unchanged set of files.
    pub fn bundle_graph(&self) -> BundleGraph {
        let mut graph = BundleGraph::new();
        for entry in self.entries() {
            let Some(digest) = entry.digest.filter(|_| entry.is_done()) else {
                continue;
            };
            let variation = self
                .config
                .lookup_chain(&entry.variation)
                .and_then(|chain| chain.first())
                .cloned()
                .unwrap_or_else(|| self.config.base_dir().to_string());
            let deps = entry
                .raw_deps
                .iter()
                .map(|(spec, dep)| {
                    let target = dep.id().map(|id| self.config.classify(id).normalized_id);
                    (spec.clone(), target)
                })
                .collect();
            graph.add_variant(
                &entry.normalized_id,
                entry.entry,
                ModuleVariant {
                    file: entry.id.clone(),
                    variation,
                    deps,
                    digest,
                },
            );
        }
        graph
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry, CacheError> {
        let environment = &self.environment;
        self.entries
            .get_mut(id)
            .ok_or_else(|| CacheError::NotFound {
                environment: environment.to_string(),
                id: id.to_string(),
            })
    }

    fn not_found(&self, id: &str) -> CacheError {
        CacheError::NotFound {
            environment: self.environment.to_string(),
            id: id.to_string(),
        }
    }

    fn emit(&mut self, event: CacheEvent) {
        self.listeners.retain(|l| l.send(event.clone()).is_ok());
    }
}

impl std::fmt::Debug for MendelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MendelCache")
            .field("environment", &self.environment)
            .field("entries", &self.entries.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
