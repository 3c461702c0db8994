//! Arena-backed bundle graph.
//!
//! Modules are stored in a flat `Vec` and addressed by [`NodeIndex`].
//! Dependencies refer to other modules by normalized id and are looked up
//! through an index map, so cycles need no special representation.

use mendel_common::SourceDigest;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Index of a module in a [`BundleGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);

/// One variation's version of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleVariant {
    /// Project-relative file id (`./src/variations/a/main.js`).
    pub file: String,
    /// Variation directory the file lives in.
    pub variation: String,
    /// Import specifier to normalized id; `None` for external modules.
    pub deps: BTreeMap<String, Option<String>>,
    /// Digest of the built source.
    pub digest: SourceDigest,
}

/// A module and all of its variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    /// Normalized id shared by every variant.
    pub id: String,
    /// Whether the module is a bundle entry point.
    pub entry: bool,
    /// Variants in insertion order. Branch indices point into this list.
    pub variants: Vec<ModuleVariant>,
}

/// A possibly cyclic graph of modules keyed by normalized id.
#[derive(Debug, Default, Clone)]
pub struct BundleGraph {
    nodes: Vec<ModuleNode>,
    index: HashMap<String, NodeIndex>,
}

impl BundleGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variant to the module `id`, creating the node on first use.
    ///
    /// A module is an entry if any of its variants was added as one.
    pub fn add_variant(&mut self, id: &str, entry: bool, variant: ModuleVariant) -> NodeIndex {
        let idx = match self.index.get(id) {
            Some(&idx) => idx,
            None => {
                let idx = NodeIndex(self.nodes.len());
                self.nodes.push(ModuleNode {
                    id: id.to_string(),
                    entry: false,
                    variants: Vec::new(),
                });
                self.index.insert(id.to_string(), idx);
                idx
            }
        };
        let node = &mut self.nodes[idx.0];
        node.entry |= entry;
        node.variants.push(variant);
        idx
    }

    /// Looks up a module by normalized id.
    pub fn lookup(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Returns the node at `idx`.
    pub fn node(&self, idx: NodeIndex) -> &ModuleNode {
        &self.nodes[idx.0]
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no modules.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Entry modules in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.entry)
            .map(|(i, _)| NodeIndex(i))
    }

    /// Depth-first, pre-order walk from every entry.
    ///
    /// `find` picks the variant whose dependencies are followed; returning
    /// `None` (or an out-of-range index) stops the walk at that module.
    /// Dependencies are followed in specifier order; external and unknown
    /// ids are skipped. Each module is visited at most once. Returns the
    /// number of modules passed to `find`.
    pub fn walk<F>(&self, mut find: F) -> usize
    where
        F: FnMut(NodeIndex, &ModuleNode) -> Option<usize>,
    {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeIndex> = self.entries().collect();
        stack.reverse();
        let mut count = 0;

        while let Some(idx) = stack.pop() {
            if visited[idx.0] {
                continue;
            }
            visited[idx.0] = true;
            count += 1;

            let node = &self.nodes[idx.0];
            let Some(variant) = find(idx, node).and_then(|v| node.variants.get(v)) else {
                continue;
            };
            let children: Vec<NodeIndex> = variant
                .deps
                .values()
                .filter_map(|dep| dep.as_deref())
                .filter_map(|dep| self.lookup(dep))
                .filter(|child| !visited[child.0])
                .collect();
            stack.extend(children.into_iter().rev());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(file: &str, dir: &str, deps: &[(&str, Option<&str>)]) -> ModuleVariant {
        ModuleVariant {
            file: file.to_string(),
            variation: dir.to_string(),
            deps: deps
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
            digest: SourceDigest::of(file.as_bytes()),
        }
    }

    #[test]
    fn walk_follows_deps_and_skips_external() {
        let mut g = BundleGraph::new();
        g.add_variant(
            "entry.js",
            true,
            variant(
                "./base/entry.js",
                "base",
                &[
                    ("./relative_dependency.js", Some("second.js")),
                    ("excluded-dependency", None),
                ],
            ),
        );
        g.add_variant("second.js", false, variant("./base/second.js", "base", &[]));

        let mut walked = Vec::new();
        let count = g.walk(|_, node| {
            walked.push(node.id.clone());
            Some(0)
        });
        assert_eq!(count, 2);
        assert_eq!(walked, vec!["entry.js", "second.js"]);
    }

    #[test]
    fn two_cycle_visits_each_node_once() {
        let mut g = BundleGraph::new();
        g.add_variant("a.js", true, variant("./a.js", "base", &[("./b.js", Some("b.js"))]));
        g.add_variant("b.js", false, variant("./b.js", "base", &[("./a.js", Some("a.js"))]));
        assert_eq!(g.walk(|_, _| Some(0)), 2);
    }

    #[test]
    fn pre_order_in_specifier_order() {
        let mut g = BundleGraph::new();
        g.add_variant(
            "main.js",
            true,
            variant(
                "./main.js",
                "base",
                &[("./z", Some("z.js")), ("./a", Some("a.js"))],
            ),
        );
        g.add_variant("a.js", false, variant("./a.js", "base", &[("./z", Some("z.js"))]));
        g.add_variant("z.js", false, variant("./z.js", "base", &[]));

        let mut order = Vec::new();
        g.walk(|_, node| {
            order.push(node.id.clone());
            Some(0)
        });
        assert_eq!(order, vec!["main.js", "a.js", "z.js"]);
    }

    #[test]
    fn unresolved_node_is_a_leaf() {
        let mut g = BundleGraph::new();
        g.add_variant("a.js", true, variant("./a.js", "base", &[("./b", Some("b.js"))]));
        g.add_variant("b.js", false, variant("./b.js", "base", &[]));
        assert_eq!(g.walk(|_, _| None), 1);
        assert_eq!(g.walk(|_, _| Some(7)), 1);
    }

    #[test]
    fn variants_accumulate_and_entry_sticks() {
        let mut g = BundleGraph::new();
        let a = g.add_variant("main.js", false, variant("./base/main.js", "base", &[]));
        let b = g.add_variant("main.js", true, variant("./a/main.js", "a", &[]));
        assert_eq!(a, b);
        assert_eq!(g.len(), 1);
        assert!(g.node(a).entry);
        assert_eq!(g.node(a).variants.len(), 2);
        assert_eq!(g.entries().collect::<Vec<_>>(), vec![a]);
        assert_eq!(g.lookup("missing.js"), None);
    }
}
