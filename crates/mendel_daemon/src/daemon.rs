//! The daemon orchestrator.

use futures::FutureExt;
use mendel_cache::{CacheEvent, CacheManager, EntryState, MendelCache};
use mendel_common::Lifecycle;
use mendel_config::{resolve_environment, EnvironmentConfig};
use mendel_core::{
    find_tree_for_hash, find_tree_for_variations, BundleGraph, ResolvedTree, TreeError,
    VariationResolver,
};
use mendel_net::{CacheServer, ClientMessage, ConnectionId, NetError, ServerEvent, ServerMessage};
use mendel_pipeline::{DepsResolver, FsEvent, Pipeline, PipelineIdle, Transformer, Watcher};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::clients::Clients;
use crate::error::DaemonError;
use crate::options::DaemonOptions;

/// Environment that background warm-up never starts.
const PRODUCTION: &str = "production";

#[derive(Debug, Default)]
struct WarmUp {
    delay: Duration,
    /// Environment whose next idle schedules the following warm-up.
    trigger: Option<String>,
    due: Option<Instant>,
}

/// Coordinates caches, pipelines, the watcher and the cache server.
///
/// All state is owned by the daemon and mutated from a single task. The
/// platform watcher and client connections talk to it through channels.
pub struct Daemon {
    root: PathBuf,
    default_env: String,
    environments: BTreeMap<String, Arc<EnvironmentConfig>>,
    manager: CacheManager,
    cache_events: UnboundedReceiver<CacheEvent>,
    pipelines: BTreeMap<String, Pipeline>,
    transformer: Arc<dyn Transformer>,
    resolver: Arc<dyn DepsResolver>,
    watcher: Option<Watcher>,
    server: Option<CacheServer>,
    clients: Clients,
    warm_up: WarmUp,
    stop: Arc<Notify>,
}

impl Daemon {
    /// Resolves the configuration of the default environment, every
    /// `[env.*]` section and `development`.
    pub fn new(
        options: DaemonOptions,
        transformer: Arc<dyn Transformer>,
        resolver: Arc<dyn DepsResolver>,
    ) -> Self {
        let mut names = vec![options.environment.clone()];
        names.extend(options.config.env.keys().cloned());
        names.push("development".to_string());

        let mut environments = BTreeMap::new();
        for name in names {
            if !environments.contains_key(&name) {
                let env = resolve_environment(&options.config, &options.root, &name);
                environments.insert(name, Arc::new(env));
            }
        }

        let mut manager = CacheManager::new();
        let cache_events = manager.subscribe();
        Self {
            root: options.root,
            default_env: options.environment,
            environments,
            manager,
            cache_events,
            pipelines: BTreeMap::new(),
            transformer,
            resolver,
            watcher: None,
            server: None,
            clients: Clients::default(),
            warm_up: WarmUp::default(),
            stop: Arc::new(Notify::new()),
        }
    }

    /// The environment started when none is named.
    pub fn default_environment(&self) -> &str {
        &self.default_env
    }

    /// Every configured environment, sorted.
    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    /// The cache manager.
    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    /// Environments whose pipeline has been created.
    pub fn started_environments(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    /// A handle that makes [`Daemon::watch`] return as if interrupted.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    fn env_config(&self, environment: &str) -> Result<Arc<EnvironmentConfig>, DaemonError> {
        self.environments
            .get(environment)
            .cloned()
            .ok_or_else(|| DaemonError::MissingEnvironmentConfig {
                environment: environment.to_string(),
            })
    }

    /// Returns the pipeline of `environment`, creating it on first use.
    ///
    /// A new environment gets its own cache, which is synced with the other
    /// caches before the pipeline starts. If the watcher runs, the
    /// environment's support directory is subscribed too.
    pub fn get_pipeline(&mut self, environment: &str) -> Result<&Pipeline, DaemonError> {
        if !self.pipelines.contains_key(environment) {
            let config = self.env_config(environment)?;
            debug!(environment, "initializing pipeline");

            let mut cache = MendelCache::new(config.clone());
            let events = cache.subscribe();
            self.manager.add_cache(cache)?;
            self.manager.sync(environment)?;

            let mut pipeline = Pipeline::new(config.clone(), events);
            pipeline.enqueue_requested(&self.manager);
            self.pipelines.insert(environment.to_string(), pipeline);

            if let (Some(watcher), Some(support)) = (self.watcher.as_mut(), config.support_dir()) {
                for id in watcher.subscribe(&[support])? {
                    self.manager.add_entry(&id);
                }
            }
        }
        self.pipelines
            .get(environment)
            .ok_or_else(|| DaemonError::MissingEnvironmentConfig {
                environment: environment.to_string(),
            })
    }

    /// The next environment to warm up: one not started yet, with
    /// `production` sorted last. Production itself is never warmed up.
    pub fn next_warm_up_env(&self) -> Option<String> {
        let mut pending: Vec<&String> = self
            .environments
            .keys()
            .filter(|env| !self.pipelines.contains_key(env.as_str()))
            .collect();
        pending.sort_by_key(|env| env.as_str() == PRODUCTION);
        pending
            .first()
            .filter(|env| env.as_str() != PRODUCTION)
            .map(|env| env.to_string())
    }

    /// Builds `environment` once and hands its cache to `callback`.
    ///
    /// Any entry that fails to build is fatal. Shutdown hooks run before
    /// returning.
    pub async fn run<F>(&mut self, environment: &str, callback: F) -> Result<(), DaemonError>
    where
        F: FnOnce(&MendelCache),
    {
        let result = self.run_once(environment, callback).await;
        self.on_exit();
        result
    }

    async fn run_once<F>(&mut self, environment: &str, callback: F) -> Result<(), DaemonError>
    where
        F: FnOnce(&MendelCache),
    {
        let config = self.env_config(environment)?;
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        self.server = Some(CacheServer::start(&config.socket_path(), server_tx).await?);
        let _fs_events = self.start_watcher(&config)?;
        self.get_pipeline(environment)?;
        self.scan_sources(&config)?;
        self.pump()?;
        while let Ok(event) = server_rx.try_recv() {
            self.handle_server_event(event)?;
        }

        let cache = self
            .manager
            .cache(environment)
            .ok_or_else(|| DaemonError::MissingEnvironmentConfig {
                environment: environment.to_string(),
            })?;
        let failed = cache
            .entries()
            .into_iter()
            .find(|entry| entry.state == EntryState::Errored);
        if let Some(entry) = failed {
            return Err(DaemonError::EntryErrored {
                environment: environment.to_string(),
                id: entry.id.clone(),
                message: entry.error.clone().unwrap_or_default(),
            });
        }
        callback(cache);
        Ok(())
    }

    /// Builds `environment`, then keeps rebuilding on file changes and
    /// serving clients until interrupted.
    ///
    /// SIGINT and SIGTERM end the loop gracefully. A panic inside the loop
    /// runs the forced shutdown hooks and is returned as
    /// [`DaemonError::Panicked`].
    pub async fn watch(&mut self, environment: &str) -> Result<(), DaemonError> {
        let outcome = AssertUnwindSafe(self.event_loop(environment))
            .catch_unwind()
            .await;
        match outcome {
            Ok(result) => {
                self.on_exit();
                result
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(%message, "force closing due to a critical error");
                self.on_force_exit();
                Err(DaemonError::Panicked { message })
            }
        }
    }

    async fn event_loop(&mut self, environment: &str) -> Result<(), DaemonError> {
        let config = self.env_config(environment)?;
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        self.server = Some(CacheServer::start(&config.socket_path(), server_tx).await?);
        let mut fs_events = self.start_watcher(&config)?;
        self.get_pipeline(environment)?;
        self.scan_sources(&config)?;

        self.warm_up.delay = Duration::from_millis(config.daemon.warm_up_delay_ms);
        self.warm_up.trigger = config.daemon.warm_up.then(|| environment.to_string());

        // Installed before the first build so signals that arrive while
        // pumping stay queued for the select below.
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let stop = self.stop.clone();
        loop {
            self.pump()?;
            let due = self.warm_up.due;
            tokio::select! {
                Some(event) = fs_events.recv() => self.handle_fs_event(event),
                Some(event) = server_rx.recv() => self.handle_server_event(event)?,
                _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    self.warm_up_next()?
                }
                _ = interrupt.recv() => {
                    info!("interrupted, exiting");
                    break;
                }
                _ = terminate.recv() => {
                    info!("terminated, exiting");
                    break;
                }
                _ = stop.notified() => break,
            }
        }
        Ok(())
    }

    fn start_watcher(
        &mut self,
        config: &EnvironmentConfig,
    ) -> Result<UnboundedReceiver<FsEvent>, DaemonError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watcher = Some(Watcher::new(&self.root, config.extensions.clone(), tx)?);
        Ok(rx)
    }

    /// Registers every module file of the environment's source directories.
    fn scan_sources(&mut self, config: &EnvironmentConfig) -> Result<usize, DaemonError> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(0);
        };
        let mut dirs = config.source_dirs();
        dirs.extend(config.support_dir());
        let ids = watcher.subscribe(&dirs)?;
        for id in &ids {
            self.manager.add_entry(id);
        }
        info!(environment = %config.name, files = ids.len(), "scanned sources");
        Ok(ids.len())
    }

    /// Drains every pipeline until none has pending work, then forwards
    /// cache changes and idle reports to subscribed clients.
    fn pump(&mut self) -> Result<Vec<PipelineIdle>, DaemonError> {
        let mut idles: BTreeMap<String, PipelineIdle> = BTreeMap::new();
        loop {
            for pipeline in self.pipelines.values_mut() {
                let drained =
                    pipeline.drain(&mut self.manager, &*self.transformer, &*self.resolver)?;
                if let Some(idle) = drained {
                    idles.insert(idle.environment.clone(), idle);
                }
            }
            // Pipelines add dependencies to every cache, including ones
            // already drained in this pass.
            if !self.pipelines.values().any(Pipeline::is_pending) {
                break;
            }
        }

        self.forward_cache_events();
        for idle in idles.values() {
            self.clients.broadcast(
                &idle.environment,
                &ServerMessage::Idle {
                    environment: idle.environment.clone(),
                    entries: idle.entries,
                },
            );
            if self.warm_up.trigger.as_deref() == Some(idle.environment.as_str()) {
                self.warm_up.trigger = None;
                self.warm_up.due = Some(Instant::now() + self.warm_up.delay);
            }
        }
        Ok(idles.into_values().collect())
    }

    fn forward_cache_events(&mut self) {
        while let Ok(event) = self.cache_events.try_recv() {
            let (environment, message) = match event {
                CacheEvent::DoneEntry { environment, id } => {
                    let entry = self
                        .manager
                        .cache(&environment)
                        .and_then(|cache| cache.get_entry(&id).ok())
                        .cloned();
                    let Some(entry) = entry else {
                        continue;
                    };
                    let message = ServerMessage::AddEntry {
                        environment: environment.to_string(),
                        entry,
                    };
                    (environment, message)
                }
                CacheEvent::EntryRemoved { environment, id }
                | CacheEvent::EntryChanged { environment, id } => {
                    let message = ServerMessage::RemoveEntry {
                        environment: environment.to_string(),
                        id,
                    };
                    (environment, message)
                }
                CacheEvent::EntryRequested { .. } | CacheEvent::EntryErrored { .. } => continue,
            };
            self.clients.broadcast(&environment, &message);
        }
    }

    fn warm_up_next(&mut self) -> Result<(), DaemonError> {
        self.warm_up.due = None;
        if let Some(environment) = self.next_warm_up_env() {
            info!(environment = %environment, "warming up environment");
            self.get_pipeline(&environment)?;
            self.warm_up.trigger = Some(environment);
        }
        Ok(())
    }

    fn handle_fs_event(&mut self, event: FsEvent) {
        debug!(?event, "file event");
        match event {
            FsEvent::Added(id) => self.manager.add_entry(&id),
            FsEvent::Changed(id) => self.manager.entry_changed(&id),
            FsEvent::Removed(id) => self.manager.remove_entry(&id),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> Result<(), DaemonError> {
        match event {
            ServerEvent::Connected { connection, outbox } => {
                self.clients.connect(connection, outbox);
            }
            ServerEvent::Disconnected { connection } => {
                self.clients.disconnect(connection);
                debug!(clients = self.clients.len(), "client left");
            }
            ServerEvent::Request {
                connection,
                message,
            } => self.handle_request(connection, message)?,
            ServerEvent::Failed { message } => {
                return Err(NetError::Io(std::io::Error::other(message)).into());
            }
        }
        Ok(())
    }

    fn handle_request(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), DaemonError> {
        match message {
            ClientMessage::Bootstrap { environment } => {
                if let Err(e) = self.prepare(&environment) {
                    return self.reject(connection, e);
                }
                let Some(cache) = self.manager.cache(&environment) else {
                    return Ok(());
                };
                let mut initial: Vec<ServerMessage> = cache
                    .entries()
                    .into_iter()
                    .filter(|entry| entry.is_done())
                    .map(|entry| ServerMessage::AddEntry {
                        environment: environment.clone(),
                        entry: entry.clone(),
                    })
                    .collect();
                initial.push(ServerMessage::Idle {
                    environment: environment.clone(),
                    entries: cache.len(),
                });
                self.clients.subscribe(connection, &environment, initial);
            }
            ClientMessage::ResolveTree {
                environment,
                variations,
            } => {
                let reply = self.resolve_tree(&environment, |graph, config| {
                    let resolver =
                        VariationResolver::new(config.base_dir(), config.variations.clone());
                    let selection = resolver.variations_and_chains(&variations);
                    find_tree_for_variations(graph, &selection.lookup_chains)
                });
                match reply {
                    Ok(reply) => self.clients.reply(connection, reply),
                    Err(e) => return self.reject(connection, e),
                }
            }
            ClientMessage::ResolveHash { environment, hash } => {
                let reply = self.resolve_tree(&environment, |graph, _| find_tree_for_hash(graph, &hash));
                match reply {
                    Ok(reply) => self.clients.reply(connection, reply),
                    Err(e) => return self.reject(connection, e),
                }
            }
        }
        Ok(())
    }

    /// Starts `environment` if needed and builds everything pending.
    fn prepare(&mut self, environment: &str) -> Result<(), DaemonError> {
        self.get_pipeline(environment)?;
        self.pump()?;
        Ok(())
    }

    fn resolve_tree<F>(&mut self, environment: &str, resolve: F) -> Result<ServerMessage, DaemonError>
    where
        F: FnOnce(&BundleGraph, &EnvironmentConfig) -> Result<ResolvedTree, TreeError>,
    {
        self.prepare(environment)?;
        let config = self.env_config(environment)?;
        let graph = self
            .manager
            .cache(environment)
            .map(MendelCache::bundle_graph)
            .unwrap_or_default();
        Ok(match resolve(&graph, &config) {
            Ok(tree) => ServerMessage::Tree {
                environment: environment.to_string(),
                hash: tree.hash,
                files: tree.files,
                variation_map: tree.variation_map,
            },
            Err(e) => ServerMessage::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        })
    }

    /// Answers a request that failed. Only a missing environment is
    /// survivable; anything else stops the daemon.
    fn reject(&mut self, connection: ConnectionId, err: DaemonError) -> Result<(), DaemonError> {
        match err {
            DaemonError::MissingEnvironmentConfig { .. } => {
                warn!(error = %err, "rejected client request");
                self.clients.reply(
                    connection,
                    ServerMessage::Error {
                        code: "NOENV".to_string(),
                        message: err.to_string(),
                    },
                );
                Ok(())
            }
            other => Err(other),
        }
    }
}

impl Lifecycle for Daemon {
    fn name(&self) -> &'static str {
        "daemon"
    }

    fn on_exit(&self) {
        debug!("exiting gracefully, cleaning up");
        self.manager.on_exit();
        self.transformer.on_exit();
        self.resolver.on_exit();
        if let Some(server) = &self.server {
            server.on_exit();
        }
        if let Some(watcher) = &self.watcher {
            watcher.on_exit();
        }
    }

    fn on_force_exit(&self) {
        debug!("instructed to force exit");
        self.manager.on_force_exit();
        self.transformer.on_force_exit();
        self.resolver.on_force_exit();
        if let Some(server) = &self.server {
            server.on_force_exit();
        }
        if let Some(watcher) = &self.watcher {
            watcher.on_force_exit();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendel_config::load_config_from_str;
    use mendel_pipeline::{FsDepsResolver, PassthroughTransformer};
    use std::path::Path;

    const CONFIG: &str = r#"
entries = ["main.js"]

[base]
dir = "src/base"

[env.production]
outdir = "build/prod"

[env.test]

[env.staging]
"#;

    fn daemon(root: &Path, environment: &str) -> Daemon {
        let options = DaemonOptions {
            root: root.to_path_buf(),
            config: load_config_from_str(CONFIG).unwrap(),
            environment: environment.to_string(),
        };
        Daemon::new(
            options,
            Arc::new(PassthroughTransformer),
            Arc::new(FsDepsResolver::new(root, vec!["js".into()])),
        )
    }

    #[test]
    fn environments_include_development() {
        let d = daemon(Path::new("/app"), "custom");
        let envs: Vec<&str> = d.environments().collect();
        assert_eq!(envs, vec!["custom", "development", "production", "staging", "test"]);
        assert_eq!(d.default_environment(), "custom");
    }

    #[test]
    fn warm_up_order_puts_production_last() {
        let mut d = daemon(Path::new("/app"), "development");
        d.get_pipeline("development").unwrap();
        assert_eq!(d.next_warm_up_env().as_deref(), Some("staging"));
        d.get_pipeline("staging").unwrap();
        assert_eq!(d.next_warm_up_env().as_deref(), Some("test"));
        d.get_pipeline("test").unwrap();
        assert_eq!(d.next_warm_up_env(), None, "production is never warmed up");
    }

    #[tokio::test(start_paused = true)]
    async fn warm_up_starts_one_environment_per_idle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/base")).unwrap();
        std::fs::write(root.join("src/base/main.js"), "").unwrap();

        let delay = Duration::from_millis(5000);
        let mut d = daemon(root, "development");
        d.warm_up.delay = delay;
        d.warm_up.trigger = Some("development".to_string());
        d.get_pipeline("development").unwrap();
        d.manager.add_entry("./src/base/main.js");

        let started = |d: &Daemon| d.started_environments().map(String::from).collect::<Vec<_>>();
        let mut expected = vec!["development".to_string()];
        for next in ["staging", "test"] {
            d.pump().unwrap();
            let due = d.warm_up.due.expect("idle arms the warm-up timer");
            assert_eq!(due.duration_since(Instant::now()), delay);
            assert_eq!(started(&d), expected, "nothing starts before the delay");

            tokio::time::advance(delay).await;
            d.warm_up_next().unwrap();
            expected.push(next.to_string());
            expected.sort();
            assert_eq!(started(&d), expected);
            assert!(d.warm_up.due.is_none(), "waits for {next} to go idle");
        }

        d.pump().unwrap();
        let due = d.warm_up.due.expect("test idle arms the timer once more");
        tokio::time::advance(due.duration_since(Instant::now())).await;
        d.warm_up_next().unwrap();
        assert_eq!(started(&d), expected, "production is never warmed up");
        assert!(d.warm_up.trigger.is_none());

        d.pump().unwrap();
        assert!(d.warm_up.due.is_none(), "the chain has ended");
    }

    #[test]
    fn missing_environment_is_an_error() {
        let mut d = daemon(Path::new("/app"), "development");
        let err = d.get_pipeline("qa").err().unwrap();
        assert!(matches!(err, DaemonError::MissingEnvironmentConfig { ref environment } if environment == "qa"));
    }

    #[test]
    fn new_pipelines_sync_from_started_ones() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/base")).unwrap();
        std::fs::write(root.join("src/base/main.js"), "require('./a');").unwrap();
        std::fs::write(root.join("src/base/a.js"), "").unwrap();

        let mut d = daemon(root, "development");
        d.get_pipeline("development").unwrap();
        d.manager.add_entry("./src/base/main.js");
        let idles = d.pump().unwrap();
        assert_eq!(idles.len(), 1);
        assert_eq!(idles[0].done, 2);

        d.get_pipeline("test").unwrap();
        let test_cache = d.manager().cache("test").unwrap();
        assert_eq!(test_cache.count(EntryState::Done), 2);
        let idles = d.pump().unwrap();
        assert_eq!(idles.len(), 1);
        assert_eq!(idles[0].environment, "test");
    }

    #[test]
    fn file_events_reach_every_cache() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/base")).unwrap();
        std::fs::write(root.join("src/base/b.js"), "").unwrap();

        let mut d = daemon(root, "development");
        d.get_pipeline("development").unwrap();
        d.get_pipeline("test").unwrap();
        d.handle_fs_event(FsEvent::Added("./src/base/b.js".into()));
        d.pump().unwrap();
        assert!(d.manager().cache("test").unwrap().get_entry("./src/base/b.js").unwrap().is_done());

        d.handle_fs_event(FsEvent::Removed("./src/base/b.js".into()));
        assert!(!d.manager().has_entry("./src/base/b.js"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
