//! Variation resolution, tree hashes and bundle graph traversal.
//!
//! Given the configured variations, this crate computes the directory lookup
//! chains for a request, walks the (possibly cyclic) bundle graph picking one
//! variant per module, and encodes the choice as a compact [`TreeHash`] that
//! can later be resolved back to the same tree.

#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod tree_hash;
pub mod trees;
pub mod variations;

pub use error::{TreeError, TreeHashError};
pub use graph::{BundleGraph, ModuleNode, ModuleVariant, NodeIndex};
pub use tree_hash::TreeHash;
pub use trees::{find_tree_for_hash, find_tree_for_variations, ResolvedTree};
pub use variations::{VariationResolver, VariationSelection};
