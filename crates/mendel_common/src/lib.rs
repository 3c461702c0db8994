//! Shared foundational types used across the Mendel build daemon.
//!
//! This crate provides content hashing for change detection, the 20-byte
//! source digests that feed tree hashes, module-id path helpers, the
//! [`Variation`] overlay description, and the [`Lifecycle`] shutdown hooks
//! implemented by daemon subsystems.

#![warn(missing_docs)]

pub mod hash;
pub mod lifecycle;
pub mod module_id;
pub mod variation;

pub use hash::{ContentHash, SourceDigest, DIGEST_LEN};
pub use lifecycle::Lifecycle;
pub use module_id::{dotted, to_module_id, trim_dir};
pub use variation::Variation;
