//! Filesystem watching for source directories.

use mendel_common::{to_module_id, Lifecycle};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::WatchError;

/// A change to a module file, by module id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// A new file appeared.
    Added(String),
    /// An existing file was modified.
    Changed(String),
    /// A file was deleted or moved away.
    Removed(String),
}

impl FsEvent {
    /// Module id of the file.
    pub fn id(&self) -> &str {
        match self {
            FsEvent::Added(id) | FsEvent::Changed(id) | FsEvent::Removed(id) => id,
        }
    }
}

/// Watches source directories and reports module file changes.
///
/// Events are sent from the platform watcher thread through the channel
/// given to [`Watcher::new`]. Only files with a configured extension under
/// the project root are reported.
pub struct Watcher {
    root: PathBuf,
    extensions: Vec<String>,
    watched: BTreeSet<PathBuf>,
    inner: Mutex<Option<RecommendedWatcher>>,
}

impl Watcher {
    /// Starts a platform watcher that forwards events to `events`.
    pub fn new(
        root: &Path,
        extensions: Vec<String>,
        events: UnboundedSender<FsEvent>,
    ) -> Result<Self, WatchError> {
        let cb_root = root.to_path_buf();
        let cb_extensions = extensions.clone();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for fs_event in translate(&cb_root, &cb_extensions, &event) {
                        let _ = events.send(fs_event);
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            },
            Config::default(),
        )?;
        Ok(Self {
            root: root.to_path_buf(),
            extensions,
            watched: BTreeSet::new(),
            inner: Mutex::new(Some(watcher)),
        })
    }

    /// Scans `dirs` for module files and starts watching them.
    ///
    /// Returns the module ids found, sorted. Missing directories are skipped
    /// and directories already subscribed are neither rescanned nor
    /// rewatched.
    pub fn subscribe(&mut self, dirs: &[PathBuf]) -> Result<Vec<String>, WatchError> {
        let mut ids = BTreeSet::new();
        for dir in dirs {
            if !dir.is_dir() || self.watched.contains(dir) {
                continue;
            }
            scan_dir(&self.root, &self.extensions, dir, &mut ids)?;
            if let Ok(mut guard) = self.inner.lock() {
                if let Some(watcher) = guard.as_mut() {
                    watcher.watch(dir, RecursiveMode::Recursive)?;
                }
            }
            debug!(dir = %dir.display(), "watching directory");
            self.watched.insert(dir.clone());
        }
        Ok(ids.into_iter().collect())
    }

    /// Directories currently watched.
    pub fn watched_dirs(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }
}

impl Lifecycle for Watcher {
    fn name(&self) -> &'static str {
        "watcher"
    }

    fn on_exit(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            if guard.take().is_some() {
                debug!(dirs = self.watched.len(), "watcher stopped");
            }
        }
    }
}

/// Recursively collects module ids under `dir`. Hidden entries and
/// `node_modules` are skipped.
fn scan_dir(
    root: &Path,
    extensions: &[String],
    dir: &Path,
    ids: &mut BTreeSet<String>,
) -> Result<(), WatchError> {
    let io_err = |source| WatchError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.') || n == "node_modules");
        if hidden {
            continue;
        }
        if path.is_dir() {
            scan_dir(root, extensions, &path, ids)?;
        } else if let Some(id) = module_id(root, extensions, &path) {
            ids.insert(id);
        }
    }
    Ok(())
}

fn module_id(root: &Path, extensions: &[String], path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !extensions.iter().any(|e| e == ext) {
        return None;
    }
    to_module_id(root, path)
}

/// Maps a platform event to module file events.
fn translate(root: &Path, extensions: &[String], event: &Event) -> Vec<FsEvent> {
    event
        .paths
        .iter()
        .filter_map(|path| {
            let id = module_id(root, extensions, path)?;
            let fs_event = match event.kind {
                EventKind::Create(_) => FsEvent::Added(id),
                EventKind::Remove(_) => FsEvent::Removed(id),
                EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
                    if path.exists() {
                        FsEvent::Added(id)
                    } else {
                        FsEvent::Removed(id)
                    }
                }
                EventKind::Modify(_) => FsEvent::Changed(id),
                _ => return None,
            };
            Some(fs_event)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode};
    use tokio::sync::mpsc;

    fn exts() -> Vec<String> {
        vec!["js".into(), "json".into()]
    }

    #[test]
    fn translate_kinds() {
        let root = Path::new("/app");
        let file = PathBuf::from("/app/src/a.js");
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone());
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(file.clone());
        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(file.clone());
        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(file.clone());

        assert_eq!(translate(root, &exts(), &create), vec![FsEvent::Added("./src/a.js".into())]);
        assert_eq!(translate(root, &exts(), &modify), vec![FsEvent::Changed("./src/a.js".into())]);
        assert_eq!(translate(root, &exts(), &remove), vec![FsEvent::Removed("./src/a.js".into())]);
        assert_eq!(translate(root, &exts(), &renamed), vec![FsEvent::Removed("./src/a.js".into())]);
    }

    #[test]
    fn translate_filters_extensions_and_root() {
        let root = Path::new("/app");
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/app/src/style.css"))
            .add_path(PathBuf::from("/elsewhere/a.js"));
        assert!(translate(root, &exts(), &event).is_empty());
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/app/src/a.js"));
        assert!(translate(root, &exts(), &access).is_empty());
    }

    #[test]
    fn subscribe_scans_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/base/components")).unwrap();
        std::fs::create_dir_all(root.join("src/base/node_modules/dep")).unwrap();
        std::fs::write(root.join("src/base/main.js"), "").unwrap();
        std::fs::write(root.join("src/base/components/b.js"), "").unwrap();
        std::fs::write(root.join("src/base/readme.md"), "").unwrap();
        std::fs::write(root.join("src/base/.hidden.js"), "").unwrap();
        std::fs::write(root.join("src/base/node_modules/dep/index.js"), "").unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = Watcher::new(root, exts(), tx).unwrap();
        let ids = watcher
            .subscribe(&[root.join("src/base"), root.join("src/missing")])
            .unwrap();
        assert_eq!(ids, vec!["./src/base/components/b.js", "./src/base/main.js"]);
        assert_eq!(watcher.watched_dirs().count(), 1);

        let again = watcher.subscribe(&[root.join("src/base")]).unwrap();
        assert!(again.is_empty());
        watcher.on_exit();
    }
}
