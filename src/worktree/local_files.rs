//! Copying untracked local files (`.env`, editor settings, ...) from a
//! human checkout into a freshly created worktree.

use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};

use crate::config::RepoFileRules;

/// Directory names never copied from, wherever they appear in a path.
pub const EXCLUDED_DIR_PARTS: [&str; 10] = [
    ".git",
    "_wt",
    "node_modules",
    ".venv",
    "dist",
    "build",
    ".next",
    "target",
    ".aws-sam",
    ".cache",
];

/// What happened to each requested local file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: Vec<PathBuf>,
    pub skipped_existing: Vec<PathBuf>,
    pub skipped_missing: Vec<PathBuf>,
    /// Specs rejected as unsafe: absolute, containing `..`, excluded, or
    /// resolving outside the source repo.
    pub skipped_invalid: Vec<String>,
    pub failed: Vec<(PathBuf, String)>,
}

impl CopyReport {
    pub fn is_empty(&self) -> bool {
        self.copied.is_empty()
            && self.skipped_existing.is_empty()
            && self.skipped_missing.is_empty()
            && self.skipped_invalid.is_empty()
            && self.failed.is_empty()
    }
}

/// A repo-relative path with no `..`, root, or prefix components.
fn safe_relative(spec: &str) -> Option<PathBuf> {
    let path = Path::new(spec);
    if spec.trim().is_empty() || path.is_absolute() {
        return None;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn is_excluded(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(part) => part
            .to_str()
            .is_some_and(|part| EXCLUDED_DIR_PARTS.contains(&part)),
        _ => false,
    })
}

/// Whether `path` resolves (through symlinks) to somewhere under `repo_root`.
fn stays_inside(path: &Path, repo_root: &Path) -> bool {
    match path.canonicalize() {
        Ok(resolved) => resolved.starts_with(repo_root),
        Err(_) => false,
    }
}

/// Expand explicit paths and glob patterns into concrete repo-relative paths.
///
/// Explicit paths are kept even if they do not exist (the copy reports them
/// as missing); pattern matches are files only. Order is explicit paths
/// first, then each pattern's matches sorted, without duplicates.
pub fn resolve_paths(source: &Path, rules: &RepoFileRules) -> (Vec<PathBuf>, Vec<String>) {
    let mut resolved: Vec<PathBuf> = Vec::new();
    let mut invalid = Vec::new();

    fn push(rel: PathBuf, resolved: &mut Vec<PathBuf>) {
        if !is_excluded(&rel) && !resolved.contains(&rel) {
            resolved.push(rel);
        }
    }

    for spec in &rules.paths {
        match safe_relative(spec) {
            Some(rel) => push(rel, &mut resolved),
            None => invalid.push(spec.clone()),
        }
    }

    let repo_root = source
        .canonicalize()
        .unwrap_or_else(|_| source.to_path_buf());

    for spec in &rules.patterns {
        let Some(rel_pattern) = safe_relative(spec) else {
            invalid.push(spec.clone());
            continue;
        };
        let full = format!(
            "{}/{}",
            Pattern::escape(&source.to_string_lossy()),
            rel_pattern.to_string_lossy()
        );
        let entries = match glob::glob(&full) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(pattern = %spec, error = %err, "invalid local file pattern");
                invalid.push(spec.clone());
                continue;
            }
        };

        let mut matches: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file() && stays_inside(path, &repo_root))
            .filter_map(|path| path.strip_prefix(source).ok().map(Path::to_path_buf))
            .filter(|rel| !is_excluded(rel))
            .collect();
        matches.sort();
        debug!(pattern = %spec, count = matches.len(), "expanded local file pattern");
        for rel in matches {
            push(rel, &mut resolved);
        }
    }

    (resolved, invalid)
}

/// Copy each repo-relative path from `source` into `dest`.
///
/// Per-file failures are logged and recorded; they never abort the rest.
pub fn copy_files(source: &Path, dest: &Path, paths: &[PathBuf], overwrite: bool) -> CopyReport {
    let mut report = CopyReport::default();
    let repo_root = source
        .canonicalize()
        .unwrap_or_else(|_| source.to_path_buf());

    for rel in paths {
        let src = source.join(rel);
        if !src.is_file() {
            report.skipped_missing.push(rel.clone());
            continue;
        }
        if !stays_inside(&src, &repo_root) {
            warn!(path = %rel.display(), "local file resolves outside the repo; skipping");
            report.skipped_invalid.push(rel.to_string_lossy().into_owned());
            continue;
        }

        let dst = dest.join(rel);
        if dst.exists() && !overwrite {
            report.skipped_existing.push(rel.clone());
            continue;
        }

        let result = match dst.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|_| fs::copy(&src, &dst));

        match result {
            Ok(_) => report.copied.push(rel.clone()),
            Err(err) => {
                warn!(path = %rel.display(), error = %err, "failed to copy local file");
                report.failed.push((rel.clone(), err.to_string()));
            }
        }
    }
    report
}

/// Resolve `rules` against `source` and copy the results into `dest`.
pub fn copy_local_files(
    source: &Path,
    dest: &Path,
    rules: &RepoFileRules,
    overwrite: bool,
) -> CopyReport {
    let (paths, invalid) = resolve_paths(source, rules);
    for spec in &invalid {
        warn!(spec = %spec, "rejected unsafe local file spec");
    }
    let mut report = copy_files(source, dest, &paths, overwrite);
    report.skipped_invalid.splice(0..0, invalid);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rules(paths: &[&str], patterns: &[&str]) -> RepoFileRules {
        RepoFileRules {
            paths: paths.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_safe_relative_rejects_escapes() {
        assert_eq!(safe_relative(".env"), Some(PathBuf::from(".env")));
        assert_eq!(
            safe_relative("./config/local.toml"),
            Some(PathBuf::from("config/local.toml"))
        );
        assert_eq!(safe_relative("../secrets"), None);
        assert_eq!(safe_relative("a/../../b"), None);
        assert_eq!(safe_relative("/etc/passwd"), None);
        assert_eq!(safe_relative(""), None);
    }

    #[test]
    fn test_resolve_paths_expands_patterns_and_skips_excluded() {
        let dir = tempdir().unwrap();
        let src = dir.path();
        fs::create_dir_all(src.join("apps/web")).unwrap();
        fs::create_dir_all(src.join("node_modules/pkg")).unwrap();
        fs::write(src.join(".env"), "A=1").unwrap();
        fs::write(src.join("apps/web/.env"), "B=2").unwrap();
        fs::write(src.join("node_modules/pkg/.env"), "C=3").unwrap();

        let (paths, invalid) = resolve_paths(src, &rules(&[".env", "../x"], &["**/.env"]));
        assert_eq!(
            paths,
            vec![PathBuf::from(".env"), PathBuf::from("apps/web/.env")]
        );
        assert_eq!(invalid, vec!["../x".to_string()]);
    }

    #[test]
    fn test_copy_skips_existing_unless_overwrite() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join(".env"), "NEW").unwrap();
        fs::write(dst.join(".env"), "OLD").unwrap();

        let report = copy_local_files(&src, &dst, &rules(&[".env", "missing.txt"], &[]), false);
        assert_eq!(report.skipped_existing, vec![PathBuf::from(".env")]);
        assert_eq!(report.skipped_missing, vec![PathBuf::from("missing.txt")]);
        assert_eq!(fs::read_to_string(dst.join(".env")).unwrap(), "OLD");

        let report = copy_local_files(&src, &dst, &rules(&[".env"], &[]), true);
        assert_eq!(report.copied, vec![PathBuf::from(".env")]);
        assert_eq!(fs::read_to_string(dst.join(".env")).unwrap(), "NEW");
    }

    #[test]
    fn test_copy_creates_nested_directories() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("config")).unwrap();
        fs::write(src.join("config/local.toml"), "x = 1").unwrap();

        let report = copy_local_files(&src, &dst, &rules(&["config/local.toml"], &[]), false);
        assert_eq!(report.copied, vec![PathBuf::from("config/local.toml")]);
        assert!(dst.join("config/local.toml").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_repo_is_rejected() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::write(dir.path().join("outside.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(dir.path().join("outside.txt"), src.join("link.txt")).unwrap();

        let report = copy_local_files(&src, &dst, &rules(&["link.txt"], &[]), false);
        assert!(report.copied.is_empty());
        assert_eq!(report.skipped_invalid, vec!["link.txt".to_string()]);
        assert!(!dst.join("link.txt").exists());
    }
}
