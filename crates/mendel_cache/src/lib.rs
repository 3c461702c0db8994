//! Per-environment module caches and the cross-environment cache manager.
//!
//! Every environment owns one [`MendelCache`] of build [`Entry`] values keyed
//! by module id. The [`CacheManager`] registers the caches, republishes their
//! [`CacheEvent`]s and copies finished entries between environments so a
//! newly started environment does not rebuild what a sibling already built.

#![warn(missing_docs)]

pub mod cache;
pub mod entry;
pub mod error;
pub mod event;
pub mod manager;

pub use cache::MendelCache;
pub use entry::{Dependency, Entry, EntryState};
pub use error::CacheError;
pub use event::CacheEvent;
pub use manager::{CacheManager, SyncReport};
