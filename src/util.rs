//! Shared path helpers for the pal crate.

use std::path::{Path, PathBuf};

use crate::config::normalize_lexically;

/// Best-effort canonical form of a path that may not exist.
///
/// Canonicalizes the path itself if it exists, otherwise its nearest
/// existing ancestor with the remaining components re-appended.
pub fn canonical_or_lexical(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let lexical = normalize_lexically(path);
    let mut tail = Vec::new();
    let mut current = lexical.as_path();
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            tail.push(name.to_os_string());
        }
        if let Ok(base) = parent.canonicalize() {
            let mut out = base;
            for name in tail.iter().rev() {
                out.push(name);
            }
            return out;
        }
        current = parent;
    }
    lexical
}

/// Whether two paths name the same location, tolerating symlinked prefixes
/// and paths that no longer exist.
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    a == b || canonical_or_lexical(a) == canonical_or_lexical(b)
}

/// Whether a file or directory name is hidden (dot-prefixed).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Locate `program` the way a shell would. A name containing a path
/// separator is checked as given.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_equal_for_missing_leaf() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone").join("api");
        let via_dot = dir.path().join(".").join("gone").join("api");
        assert!(paths_equal(&missing, &via_dot));
        assert!(!paths_equal(&missing, &dir.path().join("gone").join("web")));
        assert!(!paths_equal(&missing.join(".."), &missing));
    }

    #[test]
    fn test_canonical_or_lexical_existing() {
        let dir = tempdir().unwrap();
        assert_eq!(
            canonical_or_lexical(dir.path()),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(".auth.lock"));
        assert!(!is_hidden("auth"));
    }

    #[test]
    fn test_find_on_path_with_explicit_path() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("tool");
        std::fs::write(&tool, "").unwrap();
        assert_eq!(find_on_path(tool.to_str().unwrap()), Some(tool));
        assert_eq!(
            find_on_path(dir.path().join("absent").to_str().unwrap()),
            None
        );
        assert_eq!(find_on_path("  "), None);
    }
}
