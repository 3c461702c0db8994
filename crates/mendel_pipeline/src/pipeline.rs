//! The per-environment build pipeline.

use mendel_cache::{CacheError, CacheEvent, CacheManager, Dependency, EntryState};
use mendel_common::trim_dir;
use mendel_config::EnvironmentConfig;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::deps::{DepsResolver, Resolution};
use crate::transformer::Transformer;

/// Reported when a pipeline has no pending work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineIdle {
    /// Environment of the pipeline.
    pub environment: String,
    /// Number of entries in the cache.
    pub entries: usize,
    /// Entries built successfully.
    pub done: usize,
    /// Entries whose build failed.
    pub errored: usize,
}

/// Builds the requested entries of one environment's cache.
///
/// The pipeline listens to its own cache's events: every requested or
/// changed entry is queued and processed in arrival order. Dependencies it
/// discovers are registered through the [`CacheManager`] so every
/// environment learns about them.
pub struct Pipeline {
    config: Arc<EnvironmentConfig>,
    events: UnboundedReceiver<CacheEvent>,
    queue: VecDeque<String>,
    queued: HashSet<String>,
    reported: bool,
}

impl Pipeline {
    /// Creates a pipeline fed by `events`, the receiver of its cache.
    pub fn new(config: Arc<EnvironmentConfig>, events: UnboundedReceiver<CacheEvent>) -> Self {
        Self {
            config,
            events,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            reported: false,
        }
    }

    /// The environment this pipeline builds.
    pub fn environment(&self) -> &str {
        &self.config.name
    }

    /// The environment configuration.
    pub fn config(&self) -> &Arc<EnvironmentConfig> {
        &self.config
    }

    /// Queues every entry of the cache that is still requested.
    ///
    /// Used after a sync, whose requested entries may have been created
    /// before this pipeline subscribed.
    pub fn enqueue_requested(&mut self, manager: &CacheManager) {
        if let Some(cache) = manager.cache(self.environment()) {
            for id in cache.requested_ids() {
                self.enqueue(id);
            }
        }
    }

    /// Processes queued work until nothing is pending.
    ///
    /// Returns [`PipelineIdle`] on the first drain and on every later drain
    /// that built at least one entry; `None` when there was nothing to do.
    pub fn drain(
        &mut self,
        manager: &mut CacheManager,
        transformer: &dyn Transformer,
        resolver: &dyn DepsResolver,
    ) -> Result<Option<PipelineIdle>, CacheError> {
        let mut worked = false;
        loop {
            while let Ok(event) = self.events.try_recv() {
                match event {
                    CacheEvent::EntryRequested { id, .. } | CacheEvent::EntryChanged { id, .. } => {
                        self.enqueue(id)
                    }
                    _ => {}
                }
            }
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&id);
            worked |= self.process(&id, manager, transformer, resolver)?;
        }

        if worked || !self.reported {
            self.reported = true;
            let idle = self.idle(manager)?;
            info!(
                environment = %idle.environment,
                entries = idle.entries,
                errored = idle.errored,
                "ready for environment"
            );
            return Ok(Some(idle));
        }
        Ok(None)
    }

    /// Whether work is queued or events are waiting.
    pub fn is_pending(&self) -> bool {
        !self.queue.is_empty() || !self.events.is_empty()
    }

    fn enqueue(&mut self, id: String) {
        if self.queued.insert(id.clone()) {
            self.queue.push_back(id);
        }
    }

    fn idle(&self, manager: &CacheManager) -> Result<PipelineIdle, CacheError> {
        let cache = manager
            .cache(self.environment())
            .ok_or_else(|| self.unknown())?;
        Ok(PipelineIdle {
            environment: self.environment().to_string(),
            entries: cache.len(),
            done: cache.count(EntryState::Done),
            errored: cache.count(EntryState::Errored),
        })
    }

    /// Builds one entry. Returns `false` if it no longer needed building.
    fn process(
        &mut self,
        id: &str,
        manager: &mut CacheManager,
        transformer: &dyn Transformer,
        resolver: &dyn DepsResolver,
    ) -> Result<bool, CacheError> {
        let env = self.config.name.clone();
        let cache = manager.cache(&env).ok_or_else(|| self.unknown())?;
        let Ok(entry) = cache.get_entry(id) else {
            return Ok(false);
        };
        if entry.state != EntryState::Requested {
            return Ok(false);
        }
        let variation = entry.variation.clone();
        debug!(environment = %env, id, "building entry");

        let path = self.config.root.join(trim_dir(id));
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                let message = format!("failed to read {}: {e}", path.display());
                return self.fail(manager, id, message);
            }
        };

        let transformed = match transformer.transform(&source, &path, &self.config) {
            Ok(t) => t,
            Err(e) => return self.fail(manager, id, e.to_string()),
        };

        let chain = self
            .config
            .lookup_chain(&variation)
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| vec![self.config.base_dir().to_string()]);
        let mut deps = BTreeMap::new();
        let mut discovered = Vec::new();
        for specifier in resolver.imports(&transformed.code) {
            match resolver.resolve(&specifier, id, self.config.runtime, &chain) {
                Ok(Resolution::Resolved(dep)) => {
                    discovered.push(dep.clone());
                    deps.insert(specifier, Dependency::Resolved(dep));
                }
                Ok(Resolution::External) => {
                    deps.insert(specifier, Dependency::External);
                }
                Err(e) => return self.fail(manager, id, e.to_string()),
            }
        }

        for dep in &discovered {
            manager.add_entry(dep);
        }
        manager
            .cache_mut(&env)
            .ok_or_else(|| self.unknown())?
            .set_source(id, transformed.code, deps, transformed.map)?;
        Ok(true)
    }

    fn fail(
        &self,
        manager: &mut CacheManager,
        id: &str,
        message: String,
    ) -> Result<bool, CacheError> {
        warn!(environment = %self.config.name, id, error = %message, "entry errored");
        manager
            .cache_mut(&self.config.name)
            .ok_or_else(|| self.unknown())?
            .set_errored(id, message)?;
        Ok(true)
    }

    fn unknown(&self) -> CacheError {
        CacheError::UnknownEnvironment {
            environment: self.config.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::FsDepsResolver;
    use crate::transformer::PassthroughTransformer;
    use mendel_cache::MendelCache;
    use mendel_config::{load_config_from_str, resolve_environment};
    use std::path::Path;

    const CONFIG: &str = r#"
entries = ["main.js"]
variation_dirs = ["src/variations"]

[base]
dir = "src/base"

[[variations]]
id = "feature_A"
"#;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn setup(root: &Path, env: &str, manager: &mut CacheManager) -> Pipeline {
        let config = load_config_from_str(CONFIG).unwrap();
        let env = Arc::new(resolve_environment(&config, root, env));
        let mut cache = MendelCache::new(env.clone());
        let events = cache.subscribe();
        manager.add_cache(cache).unwrap();
        Pipeline::new(env, events)
    }

    fn resolver(root: &Path) -> FsDepsResolver {
        FsDepsResolver::new(root, vec!["js".into(), "json".into()])
    }

    #[test]
    fn first_drain_reports_idle_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = CacheManager::new();
        let mut pipeline = setup(dir.path(), "development", &mut manager);
        let r = resolver(dir.path());
        let idle = pipeline
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap()
            .unwrap();
        assert_eq!(idle.entries, 0);
        assert!(pipeline
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap()
            .is_none());
    }

    #[test]
    fn discovers_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/base/main.js", "var util = require('./util');\nrequire('react');");
        write(root, "src/base/util.js", "module.exports = require('./data.json');");
        write(root, "src/base/data.json", "{\"n\": 1}");

        let mut manager = CacheManager::new();
        let mut pipeline = setup(root, "development", &mut manager);
        manager.add_entry("./src/base/main.js");

        let r = resolver(root);
        let idle = pipeline
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap()
            .unwrap();
        assert_eq!(idle.done, 3);
        assert_eq!(idle.errored, 0);

        let cache = manager.cache("development").unwrap();
        let main = cache.get_entry("./src/base/main.js").unwrap();
        assert_eq!(
            main.raw_deps["./util"],
            Dependency::Resolved("./src/base/util.js".into())
        );
        assert_eq!(main.raw_deps["react"], Dependency::External);
        let data = cache.get_entry("./src/base/data.json").unwrap();
        assert_eq!(data.raw_source.as_deref(), Some("module.exports = {\"n\":1};"));
        assert!(manager.watched_ids().contains("./src/base/util.js"));
    }

    #[test]
    fn variation_imports_fall_back_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/variations/feature_A/main.js", "require('./util');");
        write(root, "src/base/util.js", "");

        let mut manager = CacheManager::new();
        let mut pipeline = setup(root, "development", &mut manager);
        manager.add_entry("./src/variations/feature_A/main.js");
        let r = resolver(root);
        pipeline
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap();

        let cache = manager.cache("development").unwrap();
        let main = cache.get_entry("./src/variations/feature_A/main.js").unwrap();
        assert_eq!(main.variation, "feature_A");
        assert_eq!(
            main.raw_deps["./util"],
            Dependency::Resolved("./src/base/util.js".into())
        );
    }

    #[test]
    fn errors_stay_on_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/base/main.js", "require('./missing');");
        write(root, "src/base/bad.json", "{nope");

        let mut manager = CacheManager::new();
        let mut pipeline = setup(root, "development", &mut manager);
        manager.add_entry("./src/base/main.js");
        manager.add_entry("./src/base/bad.json");
        manager.add_entry("./src/base/gone.js");

        let r = resolver(root);
        let idle = pipeline
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap()
            .unwrap();
        assert_eq!(idle.errored, 3);
        let cache = manager.cache("development").unwrap();
        let main = cache.get_entry("./src/base/main.js").unwrap();
        assert!(main.error.as_deref().unwrap().contains("Cannot find module './missing'"));
        assert_eq!(
            cache.get_entry("./src/base/gone.js").unwrap().state,
            EntryState::Errored
        );
    }

    #[test]
    fn changed_entries_rebuild_and_report_idle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/base/main.js", "one");

        let mut manager = CacheManager::new();
        let mut pipeline = setup(root, "development", &mut manager);
        manager.add_entry("./src/base/main.js");
        let r = resolver(root);
        pipeline
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap();

        write(root, "src/base/main.js", "two");
        manager.entry_changed("./src/base/main.js");
        assert!(pipeline.is_pending());
        let idle = pipeline
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap();
        assert!(idle.is_some());
        let entry = manager
            .cache("development")
            .unwrap()
            .get_entry("./src/base/main.js")
            .unwrap();
        assert_eq!(entry.raw_source.as_deref(), Some("two"));
    }

    #[test]
    fn synced_environment_reuses_sibling_builds() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/base/main.js", "require('./util');");
        write(root, "src/base/util.js", "");

        let mut manager = CacheManager::new();
        let mut dev = setup(root, "development", &mut manager);
        manager.add_entry("./src/base/main.js");
        let r = resolver(root);
        dev.drain(&mut manager, &PassthroughTransformer, &r).unwrap();

        let mut prod = setup(root, "production", &mut manager);
        let report = manager.sync("production").unwrap();
        assert_eq!(report.copied, 2);
        prod.enqueue_requested(&manager);
        let idle = prod
            .drain(&mut manager, &PassthroughTransformer, &r)
            .unwrap()
            .unwrap();
        assert_eq!(idle.done, 2);
    }
}
