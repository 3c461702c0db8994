//! `mendel build`, a one-shot build of one environment.

use mendel_cache::{EntryState, MendelCache};

use crate::{watch, BuildArgs, GlobalArgs};

/// Runs the `mendel build` command.
///
/// Returns exit code 0 when every entry built. Failed entries surface as an
/// error from the daemon.
pub async fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut daemon = watch::daemon(global)?;
    let environment = daemon.default_environment().to_string();

    let mut report = Ok(String::new());
    daemon
        .run(&environment, |cache| {
            report = if args.json {
                serde_json::to_string_pretty(&cache.entries())
            } else {
                Ok(summary(cache, global.verbose))
            };
        })
        .await?;
    let report = report?;

    if args.json {
        println!("{report}");
    } else if !global.quiet {
        eprintln!("{report}");
    }
    Ok(0)
}

fn summary(cache: &MendelCache, verbose: bool) -> String {
    let mut out = String::new();
    if verbose {
        for entry in cache.entries() {
            out.push_str(&format!("    {:<8} {}\n", format!("{:?}", entry.state), entry.id));
        }
    }
    out.push_str(&format!(
        "    Finished {} entries for {}",
        cache.count(EntryState::Done),
        cache.environment()
    ));
    out
}
