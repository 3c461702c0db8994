//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `mendel.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// No `mendel.toml` was found in the start directory or its parents.
    #[error("could not find mendel.toml in {0} or any parent directory")]
    NotFound(String),

    /// One or more configuration values failed validation.
    #[error("{}", render_problems(.0))]
    Invalid(Vec<String>),
}

fn render_problems(problems: &[String]) -> String {
    let mut out = String::from("[Bad configuration] Configuration is not valid:");
    for problem in problems {
        out.push_str("\nx ");
        out.push_str(problem);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError("expected '=' at line 3".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse configuration: expected '=' at line 3"
        );
    }

    #[test]
    fn display_invalid_lists_every_problem() {
        let err = ConfigError::Invalid(vec![
            "Required `base.dir` is not present.".to_string(),
            "Duplicate variation `a`.".to_string(),
        ]);
        let display = format!("{err}");
        assert!(display.starts_with("[Bad configuration]"));
        assert!(display.contains("\nx Required `base.dir` is not present."));
        assert!(display.contains("\nx Duplicate variation `a`."));
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::IoError(io_err);
        assert!(format!("{err}").starts_with("failed to read configuration:"));
    }
}
