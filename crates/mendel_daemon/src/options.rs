//! Startup options.

use mendel_config::{
    default_environment, find_project_root, load_config, load_config_from_str, ConfigError,
    MendelConfig,
};
use std::path::{Path, PathBuf};

use crate::error::DaemonError;

/// Everything the daemon needs to start.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Project root; module ids are relative to it.
    pub root: PathBuf,
    /// The parsed configuration.
    pub config: MendelConfig,
    /// The environment started by default.
    pub environment: String,
}

impl DaemonOptions {
    /// Loads the configuration.
    ///
    /// With `config_path` the file is read directly and its directory is the
    /// project root. Otherwise `mendel.toml` is searched for upwards from the
    /// working directory. The environment falls back to
    /// [`default_environment`].
    pub fn load(
        config_path: Option<&Path>,
        environment: Option<String>,
    ) -> Result<Self, DaemonError> {
        let (root, config) = match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(ConfigError::from)?;
                let root = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or(Path::new("."))
                    .to_path_buf();
                (root, load_config_from_str(&content)?)
            }
            None => {
                let root = find_project_root(&std::env::current_dir()?)?;
                let config = load_config(&root)?;
                (root, config)
            }
        };
        Ok(Self {
            root,
            config,
            environment: environment.unwrap_or_else(default_environment),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_path_sets_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[base]\ndir = \"src\"\n").unwrap();

        let options = DaemonOptions::load(Some(&path), Some("production".into())).unwrap();
        assert_eq!(options.root, dir.path());
        assert_eq!(options.environment, "production");
        assert_eq!(options.config.base.dir, "src");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonOptions::load(Some(&dir.path().join("nope.toml")), None).unwrap_err();
        assert!(matches!(err, DaemonError::Config(ConfigError::IoError(_))));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mendel.toml");
        std::fs::write(&path, "[base]\ndir = \"\"\n").unwrap();
        let err = DaemonOptions::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, DaemonError::Config(ConfigError::Invalid(_))));
    }
}
