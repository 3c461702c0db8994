//! Named source overlays.

use serde::{Deserialize, Serialize};

/// A named overlay of source files taking precedence over the base tree.
///
/// `chain` lists the directories consulted for this variation, most specific
/// first. For a fully resolved configuration the chain ends with the base
/// directory; the base variation's chain is just the base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    /// Variation identifier as used in requests (e.g. `feature_A`).
    pub id: String,
    /// Ordered overlay directories, most specific first.
    pub chain: Vec<String>,
}

impl Variation {
    /// Creates a variation from an id and its directory chain.
    pub fn new(id: impl Into<String>, chain: Vec<String>) -> Self {
        Self {
            id: id.into(),
            chain,
        }
    }

    /// The most specific directory of this variation, if any.
    pub fn dir(&self) -> Option<&str> {
        self.chain.first().map(String::as_str)
    }
}
