//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::MendelConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "mendel.toml";

/// Loads and validates a `mendel.toml` configuration from a project directory.
///
/// Reads `<project_dir>/mendel.toml`, parses it, and validates it.
pub fn load_config(project_dir: &Path) -> Result<MendelConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `mendel.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<MendelConfig, ConfigError> {
    let config: MendelConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Walks up from `start` until a directory containing `mendel.toml` is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(CONFIG_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    Err(ConfigError::NotFound(start.display().to_string()))
}

/// Returns the environment to use when none is given on the command line.
///
/// `MENDEL_ENV` wins over `NODE_ENV`; with neither set this is `development`.
pub fn default_environment() -> String {
    environment_from(
        std::env::var("MENDEL_ENV").ok(),
        std::env::var("NODE_ENV").ok(),
    )
}

fn environment_from(mendel_env: Option<String>, node_env: Option<String>) -> String {
    mendel_env
        .filter(|v| !v.is_empty())
        .or_else(|| node_env.filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "development".to_string())
}

/// Checks configuration consistency, collecting every problem before failing.
fn validate_config(config: &MendelConfig) -> Result<(), ConfigError> {
    let mut problems = Vec::new();
    let base_id = config.base.id.as_str();

    if base_id.is_empty() {
        problems.push("Required `base.id` is not present.".to_string());
    }
    if config.base.dir.is_empty() {
        problems.push("Required `base.dir` is not present.".to_string());
    }
    if config.extensions.is_empty() {
        problems.push("Expected `extensions` to be at least 1 long".to_string());
    }

    let mut seen = HashSet::new();
    for variation in &config.variations {
        if variation.id.is_empty() {
            problems.push("Variation with an empty `id`.".to_string());
            continue;
        }
        if variation.id == base_id {
            problems.push(format!(
                "Variation `{}` uses the base id; the base variation is implicit.",
                variation.id
            ));
        }
        if !seen.insert(variation.id.as_str()) {
            problems.push(format!("Duplicate variation `{}`.", variation.id));
        }
    }

    let declared: HashSet<&str> = config.variations.iter().map(|v| v.id.as_str()).collect();
    for variation in &config.variations {
        for link in &variation.chain {
            if link == base_id {
                problems.push(format!(
                    "Chain of `{}` names the base variation `{link}`.",
                    variation.id
                ));
            } else if !declared.contains(link.as_str()) {
                problems.push(format!(
                    "Chain of `{}` names unknown variation `{link}`.",
                    variation.id
                ));
            }
        }
    }

    if config.daemon.socket.is_empty() {
        problems.push("Required `daemon.socket` is not present.".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(problems))
    }
}
