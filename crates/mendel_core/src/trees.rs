//! Tree resolution: picking one variant per module for a request.
//!
//! A tree is the set of files reached from the entries when every module is
//! resolved to a single variant. [`find_tree_for_variations`] picks variants
//! through lookup chains and encodes the picks as a [`TreeHash`];
//! [`find_tree_for_hash`] replays a hash against the current graph.

use mendel_common::SourceDigest;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::TreeError;
use crate::graph::{BundleGraph, ModuleNode, ModuleVariant};
use crate::tree_hash::TreeHash;

/// A tree resolved against a bundle graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTree {
    /// Encoded tree hash identifying this tree.
    pub hash: String,
    /// File ids in visit order.
    pub files: Vec<String>,
    /// Normalized id to the variation directory that was picked.
    pub variation_map: BTreeMap<String, String>,
}

#[derive(Default)]
struct TreeBuilder {
    branches: Vec<usize>,
    files: Vec<String>,
    variation_map: BTreeMap<String, String>,
    digests: Vec<SourceDigest>,
}

impl TreeBuilder {
    fn record(&mut self, node: &ModuleNode, branch: usize, variant: &ModuleVariant) {
        self.branches.push(branch);
        self.files.push(variant.file.clone());
        self.variation_map
            .insert(node.id.clone(), variant.variation.clone());
        self.digests.push(variant.digest);
    }

    fn digest(&self) -> SourceDigest {
        SourceDigest::combine(&self.digests)
    }

    fn file_count(&self) -> Result<u16, TreeError> {
        u16::try_from(self.files.len()).map_err(|_| TreeError::TooManyFiles {
            count: self.files.len(),
        })
    }
}

/// Resolves the tree selected by `lookup_chains`.
///
/// For every visited module the first variant whose directory appears in the
/// chains wins, chains in order and directories in order. A module without a
/// matching variant is left out of the tree and its dependencies are not
/// followed. Its branch is recorded as the module's variant count so a hash
/// replay visits the same modules.
pub fn find_tree_for_variations(
    graph: &BundleGraph,
    lookup_chains: &[Vec<String>],
) -> Result<ResolvedTree, TreeError> {
    let mut builder = TreeBuilder::default();
    let mut failure = None;

    graph.walk(|_, node| {
        if failure.is_some() {
            return None;
        }
        if skipped_branch(node) >= usize::from(u8::MAX) {
            failure = Some(TreeError::TooManyVariants {
                id: node.id.clone(),
                count: node.variants.len(),
            });
            return None;
        }
        let picked = lookup_chains.iter().flatten().find_map(|dir| {
            node.variants
                .iter()
                .position(|variant| variant.variation == *dir)
        });
        match picked {
            Some(branch) => {
                builder.record(node, branch, &node.variants[branch]);
                Some(branch)
            }
            None => {
                builder.branches.push(skipped_branch(node));
                None
            }
        }
    });

    if let Some(err) = failure {
        return Err(err);
    }
    let hash = TreeHash::new(&builder.branches, builder.file_count()?, builder.digest())?;
    Ok(ResolvedTree {
        hash: hash.encode(),
        files: builder.files,
        variation_map: builder.variation_map,
    })
}

/// Branch recorded for a visited module that contributes no file.
fn skipped_branch(node: &ModuleNode) -> usize {
    node.variants.len()
}

/// Replays an encoded tree hash against the graph.
///
/// Consumes one branch per visited module. A branch equal to the module's
/// variant count skips the module. Fails with
/// [`TreeError::Mismatch`] when a branch is out of range, when branches or
/// files are left over or missing, or when the recomputed digest differs.
pub fn find_tree_for_hash(graph: &BundleGraph, hash: &str) -> Result<ResolvedTree, TreeError> {
    let decoded = TreeHash::decode(hash)?;
    let mut branches = decoded.branches().iter().map(|&b| usize::from(b));
    let mut builder = TreeBuilder::default();
    let mut failure: Option<String> = None;

    graph.walk(|_, node| {
        if failure.is_some() {
            return None;
        }
        let Some(branch) = branches.next() else {
            failure = Some("hash has fewer branches than the tree".to_string());
            return None;
        };
        if branch == skipped_branch(node) {
            builder.branches.push(branch);
            return None;
        }
        let Some(variant) = node.variants.get(branch) else {
            failure = Some(format!(
                "branch {branch} out of range for {} ({} variants)",
                node.id,
                node.variants.len()
            ));
            return None;
        };
        builder.record(node, branch, variant);
        Some(branch)
    });

    if let Some(reason) = failure {
        return Err(TreeError::Mismatch { reason });
    }
    if branches.next().is_some() {
        return Err(TreeError::Mismatch {
            reason: "hash has more branches than the tree".to_string(),
        });
    }
    if builder.file_count()? != decoded.file_count() {
        return Err(TreeError::Mismatch {
            reason: format!(
                "file count {} does not match {}",
                decoded.file_count(),
                builder.files.len()
            ),
        });
    }
    if builder.digest() != *decoded.digest() {
        return Err(TreeError::Mismatch {
            reason: "digest differs".to_string(),
        });
    }

    Ok(ResolvedTree {
        hash: decoded.encode(),
        files: builder.files,
        variation_map: builder.variation_map,
    })
}
