//! JSON messages exchanged over the socket.

use mendel_cache::Entry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Requests sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Subscribe to an environment: receive every done entry, then `idle`,
    /// then a stream of updates.
    Bootstrap {
        /// Environment to subscribe to.
        environment: String,
    },
    /// Resolve the tree for a set of variation ids.
    ResolveTree {
        /// Environment whose cache is used.
        environment: String,
        /// Requested variation ids.
        variations: Vec<String>,
    },
    /// Resolve the tree identified by an encoded tree hash.
    ResolveHash {
        /// Environment whose cache is used.
        environment: String,
        /// Encoded tree hash.
        hash: String,
    },
}

impl ClientMessage {
    /// The environment the request targets.
    pub fn environment(&self) -> &str {
        match self {
            ClientMessage::Bootstrap { environment }
            | ClientMessage::ResolveTree { environment, .. }
            | ClientMessage::ResolveHash { environment, .. } => environment,
        }
    }
}

/// Messages sent by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// An entry finished building.
    AddEntry {
        /// Environment of the entry.
        environment: String,
        /// The entry.
        entry: Entry,
    },
    /// An entry was removed or is being rebuilt.
    RemoveEntry {
        /// Environment of the entry.
        environment: String,
        /// Module id of the entry.
        id: String,
    },
    /// The environment's pipeline has no pending work.
    Idle {
        /// The environment.
        environment: String,
        /// Number of entries in its cache.
        entries: usize,
    },
    /// A resolved tree.
    Tree {
        /// Environment whose cache was used.
        environment: String,
        /// Encoded tree hash.
        hash: String,
        /// File ids in visit order.
        files: Vec<String>,
        /// Normalized id to the chosen variation directory.
        variation_map: BTreeMap<String, String>,
    },
    /// A request failed.
    Error {
        /// Machine-readable error code, e.g. `BADHASH`.
        code: String,
        /// Human-readable description.
        message: String,
    },
}
