//! Cached build state of one source file.

use mendel_common::{ContentHash, SourceDigest};
use mendel_config::ModuleClass;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Build state of an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Waiting to be read, transformed and resolved.
    Requested,
    /// Built; source, deps and digest are available.
    Done,
    /// The last build failed; see [`Entry::error`].
    Errored,
}

/// Where an import specifier points.
///
/// Serialized as the resolved module id, or `false` for external modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// A module id inside the project.
    Resolved(String),
    /// A module provided outside the bundle.
    External,
}

impl Dependency {
    /// The resolved module id, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Dependency::Resolved(id) => Some(id),
            Dependency::External => None,
        }
    }
}

impl Serialize for Dependency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dependency::Resolved(id) => serializer.serialize_str(id),
            Dependency::External => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for Dependency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(String),
            Flag(bool),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Dependency::Resolved(id)),
            Raw::Flag(false) => Ok(Dependency::External),
            Raw::Flag(true) => Err(de::Error::custom("dependency must be a module id or false")),
        }
    }
}

/// One source file's cached build within a single environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Project-relative id with a `./` prefix.
    pub id: String,
    /// Path relative to the variation directory.
    pub normalized_id: String,
    /// Id of the variation the file belongs to.
    pub variation: String,
    /// Built source; present once done.
    pub raw_source: Option<String>,
    /// Import specifier to resolved id or external.
    pub raw_deps: BTreeMap<String, Dependency>,
    /// Source map of the built source.
    pub map: Option<String>,
    /// Whether the module is a configured entry.
    pub entry: bool,
    /// Name under which an entry is exposed to runtime loaders.
    pub expose: Option<String>,
    #[serde(skip)]
    content_hash: Option<ContentHash>,
    /// Digest of the built source; present once done.
    pub digest: Option<SourceDigest>,
    /// Current build state.
    pub state: EntryState,
    /// Message of the last failure.
    pub error: Option<String>,
}

impl Entry {
    /// Creates a requested entry for `id` classified as `class`.
    pub fn new(id: &str, class: ModuleClass, entry: bool) -> Self {
        let expose = entry.then(|| expose_name(&class.normalized_id));
        Self {
            id: id.to_string(),
            normalized_id: class.normalized_id,
            variation: class.variation,
            raw_source: None,
            raw_deps: BTreeMap::new(),
            map: None,
            entry,
            expose,
            content_hash: None,
            digest: None,
            state: EntryState::Requested,
            error: None,
        }
    }

    /// Content hash of the built source.
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.content_hash
    }

    /// Whether the entry has been built.
    pub fn is_done(&self) -> bool {
        self.state == EntryState::Done
    }

    /// Records a successful build. Returns `false` when the source is
    /// byte-identical to the previous build.
    pub(crate) fn set_source(
        &mut self,
        raw_source: String,
        raw_deps: BTreeMap<String, Dependency>,
        map: Option<String>,
    ) -> bool {
        let hash = ContentHash::from_bytes(raw_source.as_bytes());
        let changed = self.content_hash != Some(hash);
        self.content_hash = Some(hash);
        self.digest = Some(SourceDigest::of(raw_source.as_bytes()));
        self.raw_source = Some(raw_source);
        self.raw_deps = raw_deps;
        self.map = map;
        self.state = EntryState::Done;
        self.error = None;
        changed
    }

    pub(crate) fn set_errored(&mut self, message: String) {
        self.state = EntryState::Errored;
        self.error = Some(message);
    }

    /// Back to requested; build outputs are dropped. The content hash is
    /// kept so an unchanged rebuild can be recognized.
    pub(crate) fn reset(&mut self) {
        self.raw_source = None;
        self.raw_deps.clear();
        self.map = None;
        self.digest = None;
        self.error = None;
        self.state = EntryState::Requested;
    }
}

/// Exposed name of an entry: its normalized id without the extension.
fn expose_name(normalized_id: &str) -> String {
    match normalized_id.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() && !stem.ends_with('/') => stem.to_string(),
        _ => normalized_id.to_string(),
    }
}
