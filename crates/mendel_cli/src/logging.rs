//! Log output setup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter, e.g. `mendel_pipeline=debug`.
pub const LOG_ENV: &str = "MENDEL_LOG";

/// Installs the global subscriber writing to stderr.
///
/// `MENDEL_LOG` wins when set; otherwise the level follows the flags.
pub fn init(quiet: bool, verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level(quiet, verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn default_level(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}
