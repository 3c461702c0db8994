//! Per-environment build pipelines and their collaborators.
//!
//! A [`Pipeline`] drains the requested entries of one environment's cache:
//! it reads each file, runs the [`Transformer`], resolves imports through the
//! [`DepsResolver`] and stores the result. The [`Watcher`] turns filesystem
//! changes into [`FsEvent`]s for the daemon.

#![warn(missing_docs)]

pub mod deps;
pub mod error;
pub mod pipeline;
pub mod transformer;
pub mod watcher;

pub use deps::{scan_imports, DepsResolver, FsDepsResolver, Resolution};
pub use error::{ResolveError, TransformError, WatchError};
pub use pipeline::{Pipeline, PipelineIdle};
pub use transformer::{PassthroughTransformer, Transformed, Transformer};
pub use watcher::{FsEvent, Watcher};
