//! Configuration types deserialized from `mendel.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The top-level project configuration parsed from `mendel.toml`.
///
/// Scalar settings live at the top of the file, before any table. Tables
/// describe the base tree, the ordered variation list, per-environment
/// overrides and daemon settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MendelConfig {
    /// Normalized ids of bundle entry modules (e.g. `main.js`).
    #[serde(default)]
    pub entries: Vec<String>,
    /// File extensions (without the dot) that are treated as modules.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Roots under which variation directories are looked up.
    #[serde(default)]
    pub variation_dirs: Vec<String>,
    /// Optional support directory that can add entries dynamically.
    #[serde(default)]
    pub support: Option<String>,
    /// Output directory for outlets.
    #[serde(default = "default_outdir")]
    pub outdir: String,
    /// Runtime used to pick dependency resolutions.
    #[serde(default)]
    pub runtime: Runtime,
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectMeta,
    /// The base tree every variation falls back to.
    pub base: BaseConfig,
    /// Variations in declaration order. Order is significant.
    #[serde(default)]
    pub variations: Vec<VariationDef>,
    /// Per-environment overrides keyed by environment name.
    #[serde(default)]
    pub env: BTreeMap<String, EnvOverride>,
    /// Daemon and IPC settings.
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Project metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectMeta {
    /// The project name, used in logs.
    #[serde(default)]
    pub name: String,
}

/// The base tree configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BaseConfig {
    /// Identifier of the base variation.
    #[serde(default = "default_base_id")]
    pub id: String,
    /// Directory of the base tree, relative to the project root.
    #[serde(default)]
    pub dir: String,
}

/// A variation as declared in the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VariationDef {
    /// Variation identifier; also the name of its own directory.
    pub id: String,
    /// Additional directories this variation inherits from, most specific first.
    #[serde(default)]
    pub chain: Vec<String>,
}

/// Runtime flavor used when picking between browser and server resolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Browser bundles (`browser` field of `package.json` wins).
    #[default]
    Browser,
    /// Server-side bundles (`main` field of `package.json`).
    Main,
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Browser => f.write_str("browser"),
            Runtime::Main => f.write_str("main"),
        }
    }
}

/// Settings an environment may override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvOverride {
    /// Overrides [`MendelConfig::outdir`].
    pub outdir: Option<String>,
    /// Overrides [`MendelConfig::support`].
    pub support: Option<String>,
    /// Overrides [`MendelConfig::runtime`].
    pub runtime: Option<Runtime>,
    /// Overrides [`MendelConfig::entries`].
    pub entries: Option<Vec<String>>,
}

/// Daemon settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Path of the IPC socket, relative to the project root.
    #[serde(default = "default_socket")]
    pub socket: String,
    /// Warm up other environments once the primary one is idle.
    #[serde(default = "default_true")]
    pub warm_up: bool,
    /// Delay between consecutive environment warm-ups.
    #[serde(default = "default_warm_up_delay_ms")]
    pub warm_up_delay_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            warm_up: true,
            warm_up_delay_ms: default_warm_up_delay_ms(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["js", "jsx", "mjs", "json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_outdir() -> String {
    "build".to_string()
}

fn default_base_id() -> String {
    "base".to_string()
}

fn default_socket() -> String {
    ".mendelipc".to_string()
}

fn default_true() -> bool {
    true
}

fn default_warm_up_delay_ms() -> u64 {
    5_000
}
