//! Parsing and validation of `mendel.toml` project configuration files.
//!
//! This crate reads the project configuration and produces a strongly-typed
//! [`MendelConfig`], then resolves it per environment into an
//! [`EnvironmentConfig`] with fully expanded variation chains and module-id
//! classification.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{default_environment, find_project_root, load_config, load_config_from_str};
pub use resolve::{resolve_environment, EnvironmentConfig, ModuleClass};
pub use types::*;
