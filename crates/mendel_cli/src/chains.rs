//! `mendel chains`, prints the lookup chains of requested variations.

use std::path::Path;

use mendel_config::resolve_environment;
use mendel_core::{VariationResolver, VariationSelection};
use mendel_daemon::DaemonOptions;

use crate::{ChainsArgs, GlobalArgs};

/// Runs the `mendel chains` command.
pub fn run(args: &ChainsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let options = DaemonOptions::load(global.config.as_deref().map(Path::new), global.env.clone())?;
    let env = resolve_environment(&options.config, &options.root, &options.environment);
    let resolver = VariationResolver::new(env.base_dir(), env.variations.clone());
    let selection = resolver.variations_and_chains(&args.variations);
    println!("{}", render(&selection));
    Ok(0)
}

fn render(selection: &VariationSelection) -> String {
    let mut lines = Vec::with_capacity(selection.lookup_chains.len());
    for (i, chain) in selection.lookup_chains.iter().enumerate() {
        let label = selection
            .variations
            .get(i)
            .map(|v| v.id.as_str())
            .unwrap_or("(base)");
        lines.push(format!("{label}: {}", chain.join(" -> ")));
    }
    lines.join("\n")
}
