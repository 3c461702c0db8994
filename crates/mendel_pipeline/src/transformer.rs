//! The source transform step.

use mendel_common::Lifecycle;
use mendel_config::EnvironmentConfig;
use std::path::Path;

use crate::error::TransformError;

/// Output of a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    /// Transformed source code.
    pub code: String,
    /// Source map, if the transform produced one.
    pub map: Option<String>,
}

/// Turns raw source into the code that is cached and served.
///
/// Implementations are shared across every environment's pipeline and
/// receive the environment configuration with each call.
pub trait Transformer: Lifecycle + Send + Sync {
    /// Transforms the source of the file at `path`.
    fn transform(
        &self,
        source: &str,
        path: &Path,
        config: &EnvironmentConfig,
    ) -> Result<Transformed, TransformError>;
}

/// Leaves JavaScript untouched and wraps JSON files as CommonJS modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransformer;

impl Transformer for PassthroughTransformer {
    fn transform(
        &self,
        source: &str,
        path: &Path,
        _config: &EnvironmentConfig,
    ) -> Result<Transformed, TransformError> {
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if !is_json {
            return Ok(Transformed {
                code: source.to_string(),
                map: None,
            });
        }
        let value: serde_json::Value =
            serde_json::from_str(source).map_err(|e| TransformError::Syntax {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Transformed {
            code: format!("module.exports = {value};"),
            map: None,
        })
    }
}

impl Lifecycle for PassthroughTransformer {
    fn name(&self) -> &'static str {
        "transformer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mendel_config::{load_config_from_str, resolve_environment};

    fn env() -> EnvironmentConfig {
        let config = load_config_from_str("[base]\ndir = \"src\"\n").unwrap();
        resolve_environment(&config, Path::new("/app"), "development")
    }

    #[test]
    fn javascript_is_unchanged() {
        let out = PassthroughTransformer
            .transform("require('./a');", Path::new("/app/src/main.js"), &env())
            .unwrap();
        assert_eq!(out.code, "require('./a');");
        assert!(out.map.is_none());
    }

    #[test]
    fn json_is_wrapped() {
        let out = PassthroughTransformer
            .transform("{\"a\": 1}", Path::new("/app/src/data.json"), &env())
            .unwrap();
        assert_eq!(out.code, "module.exports = {\"a\":1};");
    }

    #[test]
    fn invalid_json_is_syntax_error() {
        let err = PassthroughTransformer
            .transform("{oops", Path::new("/app/src/data.json"), &env())
            .unwrap_err();
        assert!(matches!(err, TransformError::Syntax { .. }));
    }
}
