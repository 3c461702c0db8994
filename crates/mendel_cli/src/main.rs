//! Mendel CLI, the command-line interface for the Mendel build daemon.
//!
//! Provides `mendel watch` to run the daemon, `mendel build` for a one-shot
//! build, and two offline helpers: `mendel chains` prints the lookup chains of
//! a set of variations and `mendel decode-hash` inspects a tree hash.

#![warn(missing_docs)]

mod build;
mod chains;
mod decode_hash;
mod logging;
mod watch;

use std::process;

use clap::{Parser, Subcommand};

/// Mendel, a variation-aware build cache and pipeline daemon.
#[derive(Parser, Debug)]
#[command(name = "mendel", version, about = "Mendel build daemon")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `mendel.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Environment to build (defaults to `MENDEL_ENV`, then `NODE_ENV`).
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build, then keep rebuilding on changes and serve clients.
    Watch,
    /// Build the environment once and exit.
    Build(BuildArgs),
    /// Print the lookup chains for a set of variations.
    Chains(ChainsArgs),
    /// Decode a tree hash.
    DecodeHash {
        /// The URL-safe base64 tree hash.
        hash: String,
    },
}

/// Arguments for the `mendel build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Print every built entry as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `mendel chains` subcommand.
#[derive(Parser, Debug)]
pub struct ChainsArgs {
    /// Requested variation ids.
    pub variations: Vec<String>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
    /// Optional environment override.
    pub env: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        env: cli.env,
    };

    let result = match cli.command {
        Command::Watch => watch::run(&global).await,
        Command::Build(ref args) => build::run(args, &global).await,
        Command::Chains(ref args) => chains::run(args, &global),
        Command::DecodeHash { ref hash } => decode_hash::run(hash, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
