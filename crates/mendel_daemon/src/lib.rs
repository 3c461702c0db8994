//! The Mendel daemon.
//!
//! [`Daemon`] owns the cache manager and one [`Pipeline`](mendel_pipeline::Pipeline)
//! per started environment. It runs either once ([`Daemon::run`]) or as a
//! long-lived watcher ([`Daemon::watch`]) that rebuilds on file changes,
//! serves cache contents over the daemon socket and warms up the other
//! environments in the background.

#![warn(missing_docs)]

mod clients;
pub mod daemon;
pub mod error;
pub mod options;

pub use daemon::Daemon;
pub use error::DaemonError;
pub use options::DaemonOptions;
