//! Lifecycle events published by caches.

use std::sync::Arc;

/// An entry lifecycle event, tagged with the environment of the cache that
/// emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// An entry was created and needs building.
    EntryRequested {
        /// Originating environment.
        environment: Arc<str>,
        /// Module id.
        id: String,
    },
    /// An entry finished building.
    DoneEntry {
        /// Originating environment.
        environment: Arc<str>,
        /// Module id.
        id: String,
    },
    /// A file changed on disk; the entry is requested again.
    EntryChanged {
        /// Originating environment.
        environment: Arc<str>,
        /// Module id.
        id: String,
    },
    /// An entry was deleted.
    EntryRemoved {
        /// Originating environment.
        environment: Arc<str>,
        /// Module id.
        id: String,
    },
    /// Building an entry failed.
    EntryErrored {
        /// Originating environment.
        environment: Arc<str>,
        /// Module id.
        id: String,
        /// Failure message.
        message: String,
    },
}

impl CacheEvent {
    /// Environment of the cache that emitted the event.
    pub fn environment(&self) -> &str {
        match self {
            CacheEvent::EntryRequested { environment, .. }
            | CacheEvent::DoneEntry { environment, .. }
            | CacheEvent::EntryChanged { environment, .. }
            | CacheEvent::EntryRemoved { environment, .. }
            | CacheEvent::EntryErrored { environment, .. } => environment,
        }
    }

    /// Module id the event is about.
    pub fn id(&self) -> &str {
        match self {
            CacheEvent::EntryRequested { id, .. }
            | CacheEvent::DoneEntry { id, .. }
            | CacheEvent::EntryChanged { id, .. }
            | CacheEvent::EntryRemoved { id, .. }
            | CacheEvent::EntryErrored { id, .. } => id,
        }
    }

    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheEvent::EntryRequested { .. } => "entryRequested",
            CacheEvent::DoneEntry { .. } => "doneEntry",
            CacheEvent::EntryChanged { .. } => "entryChanged",
            CacheEvent::EntryRemoved { .. } => "entryRemoved",
            CacheEvent::EntryErrored { .. } => "entryErrored",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let event = CacheEvent::EntryErrored {
            environment: Arc::from("production"),
            id: "./src/a.js".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(event.environment(), "production");
        assert_eq!(event.id(), "./src/a.js");
        assert_eq!(event.kind(), "entryErrored");
    }
}
