//! `mendel watch`, the long-running daemon.

use std::path::Path;
use std::sync::Arc;

use mendel_daemon::{Daemon, DaemonOptions};
use mendel_pipeline::{FsDepsResolver, PassthroughTransformer};

use crate::GlobalArgs;

/// Loads the configuration and builds a daemon with the default collaborators.
pub fn daemon(global: &GlobalArgs) -> Result<Daemon, Box<dyn std::error::Error>> {
    let options = DaemonOptions::load(global.config.as_deref().map(Path::new), global.env.clone())?;
    let resolver = FsDepsResolver::new(options.root.clone(), options.config.extensions.clone());
    Ok(Daemon::new(
        options,
        Arc::new(PassthroughTransformer),
        Arc::new(resolver),
    ))
}

/// Runs the `mendel watch` command until interrupted.
pub async fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut daemon = daemon(global)?;
    let environment = daemon.default_environment().to_string();
    if !global.quiet {
        eprintln!("    Watching {environment}");
    }
    daemon.watch(&environment).await?;
    Ok(0)
}
