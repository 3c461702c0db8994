//! Lookup chains for requested variations.

use mendel_common::Variation;

/// Computes lookup chains for sets of requested variation ids.
#[derive(Debug, Clone)]
pub struct VariationResolver {
    base_dir: String,
    variations: Vec<Variation>,
}

/// The variations matched by a request and the directory chains to search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationSelection {
    /// Matched variations in configuration order.
    pub variations: Vec<Variation>,
    /// One chain per matched variation, then the base chain last.
    pub lookup_chains: Vec<Vec<String>>,
}

impl VariationResolver {
    /// Creates a resolver over the configured variations, in declaration order.
    pub fn new(base_dir: impl Into<String>, variations: Vec<Variation>) -> Self {
        Self {
            base_dir: base_dir.into(),
            variations,
        }
    }

    /// The base directory every chain falls back to.
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Configured variations in declaration order.
    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    /// Resolves requested variation ids into lookup chains.
    ///
    /// Ids are matched against variation ids only, never against directory
    /// names, and unknown ids are ignored. Output follows configuration order
    /// so any permutation of `requested` yields the same chains. Each chain
    /// has the base directory stripped; the base chain is appended last.
    pub fn variations_and_chains<S: AsRef<str>>(&self, requested: &[S]) -> VariationSelection {
        let mut variations = Vec::new();
        let mut lookup_chains = Vec::new();

        for variation in &self.variations {
            if !requested.iter().any(|r| r.as_ref() == variation.id) {
                continue;
            }
            let mut chain: Vec<String> = Vec::with_capacity(variation.chain.len());
            for dir in &variation.chain {
                if *dir != self.base_dir && !chain.contains(dir) {
                    chain.push(dir.clone());
                }
            }
            if chain.is_empty() {
                continue;
            }
            variations.push(variation.clone());
            lookup_chains.push(chain);
        }

        lookup_chains.push(vec![self.base_dir.clone()]);
        VariationSelection {
            variations,
            lookup_chains,
        }
    }
}
