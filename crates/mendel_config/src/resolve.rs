//! Environment resolution: merging overrides and expanding variation chains.

use crate::types::{BaseConfig, DaemonConfig, MendelConfig, Runtime};
use mendel_common::{trim_dir, Variation};
use std::path::{Path, PathBuf};

/// A fully resolved configuration for one environment.
///
/// `[env.<name>]` overrides are applied, every variation carries its full
/// directory chain ending at the base directory, and the base variation is
/// the last element of [`EnvironmentConfig::variations`].
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Environment name (`development`, `production`, ...).
    pub name: String,
    /// Absolute project root.
    pub root: PathBuf,
    /// Project name.
    pub project: String,
    /// Base variation with a trimmed directory.
    pub base: BaseConfig,
    /// Every variation with its full chain; the base variation is last.
    pub variations: Vec<Variation>,
    /// Normalized ids of entry modules.
    pub entries: Vec<String>,
    /// Module file extensions, without the dot.
    pub extensions: Vec<String>,
    /// Support directory, relative to the root.
    pub support: Option<String>,
    /// Output directory, relative to the root.
    pub outdir: String,
    /// Runtime for dependency resolution.
    pub runtime: Runtime,
    /// Daemon settings.
    pub daemon: DaemonConfig,
}

/// Where a module id lives within the variation layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleClass {
    /// Id of the variation whose directory holds the file.
    pub variation: String,
    /// Path of the file relative to that variation directory.
    pub normalized_id: String,
}

impl EnvironmentConfig {
    /// The base directory, relative to the root.
    pub fn base_dir(&self) -> &str {
        &self.base.dir
    }

    /// Every distinct variation directory in configuration order, base last.
    pub fn all_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        for variation in &self.variations {
            for dir in &variation.chain {
                if !dirs.contains(dir) {
                    dirs.push(dir.clone());
                }
            }
        }
        dirs
    }

    /// Absolute paths of the directories the watcher subscribes to.
    pub fn source_dirs(&self) -> Vec<PathBuf> {
        self.all_dirs()
            .iter()
            .map(|dir| self.root.join(dir))
            .collect()
    }

    /// Absolute path of the support directory, if one is configured.
    pub fn support_dir(&self) -> Option<PathBuf> {
        self.support.as_ref().map(|dir| self.root.join(dir))
    }

    /// Absolute path of the daemon socket.
    pub fn socket_path(&self) -> PathBuf {
        self.root.join(&self.daemon.socket)
    }

    /// The directory chain of a variation id.
    pub fn lookup_chain(&self, variation: &str) -> Option<&[String]> {
        self.variations
            .iter()
            .find(|v| v.id == variation)
            .map(|v| v.chain.as_slice())
    }

    /// Classifies a module id by the longest variation directory containing it.
    ///
    /// Files outside every variation directory are attributed to the base
    /// variation and keep their trimmed id as the normalized id.
    pub fn classify(&self, id: &str) -> ModuleClass {
        let path = trim_dir(id);
        let mut best: Option<(&Variation, &str)> = None;
        for variation in &self.variations {
            let Some(dir) = variation.dir() else {
                continue;
            };
            let Some(rest) = path
                .strip_prefix(dir)
                .and_then(|rest| rest.strip_prefix('/'))
            else {
                continue;
            };
            let longer = best.map_or(true, |(b, _)| b.dir().map_or(0, str::len) < dir.len());
            if longer {
                best = Some((variation, rest));
            }
        }
        match best {
            Some((variation, rest)) => ModuleClass {
                variation: variation.id.clone(),
                normalized_id: rest.to_string(),
            },
            None => ModuleClass {
                variation: self.base.id.clone(),
                normalized_id: path.to_string(),
            },
        }
    }

    /// Whether a normalized id is one of the configured entries.
    pub fn is_entry(&self, normalized_id: &str) -> bool {
        self.entries.iter().any(|e| trim_dir(e) == normalized_id)
    }

    /// Whether a path has one of the configured module extensions.
    pub fn has_module_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}

/// Resolves the configuration for one environment rooted at `root`.
///
/// Environments without an `[env.<name>]` table get the top-level settings.
pub fn resolve_environment(config: &MendelConfig, root: &Path, env: &str) -> EnvironmentConfig {
    let overrides = config.env.get(env).cloned().unwrap_or_default();
    let base_dir = trim_dir(&config.base.dir).to_string();

    let mut variations = Vec::with_capacity(config.variations.len() + 1);
    for def in &config.variations {
        let mut chain = vec![variation_dir(config, root, &def.id)];
        for link in &def.chain {
            let dir = variation_dir(config, root, link);
            if !chain.contains(&dir) {
                chain.push(dir);
            }
        }
        if !chain.contains(&base_dir) {
            chain.push(base_dir.clone());
        }
        variations.push(Variation::new(def.id.clone(), chain));
    }
    variations.push(Variation::new(config.base.id.clone(), vec![base_dir.clone()]));

    EnvironmentConfig {
        name: env.to_string(),
        root: root.to_path_buf(),
        project: config.project.name.clone(),
        base: BaseConfig {
            id: config.base.id.clone(),
            dir: base_dir,
        },
        variations,
        entries: overrides
            .entries
            .unwrap_or_else(|| config.entries.clone()),
        extensions: config.extensions.clone(),
        support: overrides
            .support
            .or_else(|| config.support.clone())
            .map(|s| trim_dir(&s).to_string()),
        outdir: overrides.outdir.unwrap_or_else(|| config.outdir.clone()),
        runtime: overrides.runtime.unwrap_or(config.runtime),
        daemon: config.daemon.clone(),
    }
}

/// The directory of a variation: the first variation root holding it, else
/// the first root.
fn variation_dir(config: &MendelConfig, root: &Path, id: &str) -> String {
    let roots: Vec<&str> = config.variation_dirs.iter().map(|d| trim_dir(d)).collect();
    let found = roots
        .iter()
        .find(|r| root.join(r).join(id).is_dir())
        .or(roots.first());
    match found {
        Some(r) if !r.is_empty() => format!("{r}/{id}"),
        _ => id.to_string(),
    }
}
