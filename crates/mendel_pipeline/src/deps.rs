//! Dependency discovery and resolution across variation directories.

use mendel_common::{to_module_id, trim_dir, Lifecycle};
use mendel_config::Runtime;
use std::path::{Path, PathBuf};

use crate::error::ResolveError;

/// Where an import specifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A module id inside the project.
    Resolved(String),
    /// A module provided outside the bundle.
    External,
}

/// Finds and resolves the imports of transformed code.
pub trait DepsResolver: Lifecycle + Send + Sync {
    /// Import specifiers of `code`, in first-seen order without duplicates.
    fn imports(&self, code: &str) -> Vec<String>;

    /// Resolves `specifier` imported by the module `from`.
    ///
    /// Relative specifiers are looked up through `chain`, most specific
    /// directory first, so a variation can override any file it imports.
    fn resolve(
        &self,
        specifier: &str,
        from: &str,
        runtime: Runtime,
        chain: &[String],
    ) -> Result<Resolution, ResolveError>;
}

/// Resolves specifiers against the project tree on disk.
#[derive(Debug, Clone)]
pub struct FsDepsResolver {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsDepsResolver {
    /// Creates a resolver for the project at `root`.
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    /// Tries `path`, then `path.<ext>`, then `path/index.<ext>`.
    fn find_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        let name = path.file_name()?.to_str()?;
        for ext in &self.extensions {
            let candidate = path.with_file_name(format!("{name}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        for ext in &self.extensions {
            let candidate = path.join(format!("index.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn resolve_relative(&self, specifier: &str, from: &str, chain: &[String]) -> Option<String> {
        let from_path = trim_dir(from);
        let from_dir = Path::new(from_path).parent().unwrap_or(Path::new(""));

        // Position of the importing file inside its variation directory.
        let inner = chain
            .iter()
            .find_map(|dir| from_dir.strip_prefix(dir).ok());

        let candidates: Vec<PathBuf> = match inner {
            Some(inner) => chain
                .iter()
                .map(|dir| self.root.join(dir).join(&inner).join(specifier))
                .collect(),
            None => vec![self.root.join(from_dir).join(specifier)],
        };
        candidates
            .iter()
            .find_map(|candidate| self.find_file(&normalize(candidate)))
            .and_then(|file| to_module_id(&self.root, &file))
    }

    fn resolve_package(&self, specifier: &str, runtime: Runtime) -> Option<String> {
        let (package, subpath) = split_package(specifier);
        let package_dir = self.root.join("node_modules").join(package);
        if !package_dir.is_dir() {
            return None;
        }
        let target = match subpath {
            Some(sub) => package_dir.join(sub),
            None => package_dir.join(package_main(&package_dir, runtime)),
        };
        self.find_file(&normalize(&target))
            .and_then(|file| to_module_id(&self.root, &file))
    }
}

impl DepsResolver for FsDepsResolver {
    fn imports(&self, code: &str) -> Vec<String> {
        scan_imports(code)
    }

    fn resolve(
        &self,
        specifier: &str,
        from: &str,
        runtime: Runtime,
        chain: &[String],
    ) -> Result<Resolution, ResolveError> {
        let not_found = || ResolveError::NotFound {
            specifier: specifier.to_string(),
            from: from.to_string(),
        };
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." {
            return self
                .resolve_relative(specifier, from, chain)
                .map(Resolution::Resolved)
                .ok_or_else(not_found);
        }
        if let Some(absolute) = specifier.strip_prefix('/') {
            return self
                .find_file(&self.root.join(absolute))
                .and_then(|file| to_module_id(&self.root, &file))
                .map(Resolution::Resolved)
                .ok_or_else(not_found);
        }
        Ok(self
            .resolve_package(specifier, runtime)
            .map(Resolution::Resolved)
            .unwrap_or(Resolution::External))
    }
}

impl Lifecycle for FsDepsResolver {
    fn name(&self) -> &'static str {
        "deps resolver"
    }
}

/// Splits `@scope/pkg/sub/path` or `pkg/sub/path` into package and subpath.
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let split_at = if specifier.starts_with('@') {
        specifier
            .match_indices('/')
            .nth(1)
            .map(|(i, _)| i)
    } else {
        specifier.find('/')
    };
    match split_at {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}

/// Entry file of a package: `browser` for browser bundles when it is a
/// string, else `main`, else `index`.
fn package_main(package_dir: &Path, runtime: Runtime) -> String {
    let manifest = std::fs::read_to_string(package_dir.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok());
    let field = |name: &str| {
        manifest
            .as_ref()
            .and_then(|m| m.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let main = match runtime {
        Runtime::Browser => field("browser").or_else(|| field("main")),
        Runtime::Main => field("main"),
    };
    main.unwrap_or_else(|| "index".to_string())
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Finds import specifiers in JavaScript source.
///
/// Recognizes `require('x')`, `import('x')`, `import 'x'` and
/// `import ... from 'x'` / `export ... from 'x'`. Comments are skipped and
/// template literals with substitutions are ignored.
pub fn scan_imports(code: &str) -> Vec<String> {
    let bytes = code.as_bytes();
    let mut found: Vec<String> = Vec::new();
    let mut word: &str = "";
    let mut open_paren = false;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
            }
            b'\'' | b'"' | b'`' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] != c {
                    if bytes[end] == b'\\' {
                        end += 1;
                    }
                    end += 1;
                }
                let literal = code.get(start..end.min(bytes.len())).unwrap_or("");
                let wanted = matches!(
                    (word, open_paren),
                    ("require", true) | ("import", _) | ("from", false)
                );
                if wanted
                    && !literal.is_empty()
                    && !(c == b'`' && literal.contains("${"))
                    && !found.iter().any(|f| f == literal)
                {
                    found.push(literal.to_string());
                }
                word = "";
                open_paren = false;
                i = end + 1;
            }
            c if c.is_ascii_alphabetic() || c == b'_' || c == b'$' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
                {
                    i += 1;
                }
                word = &code[start..i];
                open_paren = false;
            }
            b'(' if !word.is_empty() && !open_paren => {
                open_paren = true;
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                word = "";
                open_paren = false;
                i += 1;
            }
        }
    }
    found
}
