//! Daemon errors.

use mendel_cache::CacheError;
use mendel_config::ConfigError;
use mendel_net::NetError;
use mendel_pipeline::WatchError;

/// Errors that stop the daemon.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// An environment was requested that the configuration does not define.
    #[error(
        "[Mendel] Client is expecting an environment \"{environment}\" \
         but it is missing from the configuration."
    )]
    MissingEnvironmentConfig {
        /// The requested environment.
        environment: String,
    },

    /// A file failed to build in run mode.
    #[error("{id} failed to build for {environment}: {message}")]
    EntryErrored {
        /// Environment of the failed entry.
        environment: String,
        /// Module id of the failed entry.
        id: String,
        /// The build error.
        message: String,
    },

    /// The cache server could not start or stopped accepting connections.
    #[error(transparent)]
    Server(#[from] NetError),

    /// A cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The file watcher failed.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Installing a signal handler or reading the working directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The event loop panicked.
    #[error("[Mendel] Force closing due to a critical error: {message}")]
    Panicked {
        /// The panic payload.
        message: String,
    },
}
