//! Project-relative module identifiers.
//!
//! Module ids are the keys of every cache: the file's path relative to the
//! project root, `/`-separated, with a leading `./`.

use std::path::{Component, Path};

/// Converts a filesystem path under `root` into a module id.
///
/// Returns `None` if `path` is not inside `root` or contains non-UTF-8
/// components.
pub fn to_module_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("./{}", parts.join("/")))
}

/// Strips a leading `./` and any trailing `/` from an id or directory name.
pub fn trim_dir(name: &str) -> &str {
    let name = name.strip_prefix("./").unwrap_or(name);
    name.trim_end_matches('/')
}

/// Prefixes a project-relative path with `./` unless already present.
pub fn dotted(path: &str) -> String {
    if path.starts_with("./") {
        path.to_string()
    } else {
        format!("./{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_id_is_dotted_relative() {
        let id = to_module_id(Path::new("/app"), Path::new("/app/src/base/main.js"));
        assert_eq!(id.as_deref(), Some("./src/base/main.js"));
    }

    #[test]
    fn outside_root_has_no_id() {
        assert!(to_module_id(Path::new("/app"), Path::new("/other/main.js")).is_none());
        assert!(to_module_id(Path::new("/app"), Path::new("/app")).is_none());
    }

    #[test]
    fn trim_and_dot() {
        assert_eq!(trim_dir("./src/base/"), "src/base");
        assert_eq!(trim_dir("src"), "src");
        assert_eq!(dotted("src/a.js"), "./src/a.js");
        assert_eq!(dotted("./src/a.js"), "./src/a.js");
    }
}
