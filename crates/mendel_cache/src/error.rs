//! Error types for cache operations.

/// Errors that can occur during cache and cache manager operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The cache holds no entry with this id.
    #[error("no entry {id} in {environment} cache")]
    NotFound {
        /// Environment of the cache.
        environment: String,
        /// Requested module id.
        id: String,
    },

    /// A cache for this environment is already registered.
    #[error("a cache for environment {environment} is already registered")]
    DuplicateEnvironment {
        /// The environment name.
        environment: String,
    },

    /// No cache is registered for this environment.
    #[error("no cache registered for environment {environment}")]
    UnknownEnvironment {
        /// The environment name.
        environment: String,
    },
}
