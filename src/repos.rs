//! Repository discovery under the project root.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::WorkspaceError;
use crate::git::has_git_metadata;
use crate::util::paths_equal;

/// Directory names never treated as repositories.
const SKIPPED_DIRS: [&str; 4] = [".git", ".venv", "node_modules", "target"];

/// A human checkout under the project root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Repo {
    pub name: String,
    pub path: PathBuf,
}

/// Look up one repo by name, checking that it exists and carries git metadata.
pub fn open(root: &Path, name: &str) -> Result<Repo, WorkspaceError> {
    let path = root.join(name);
    if name.is_empty() || name.contains(['/', '\\']) || !path.is_dir() {
        return Err(WorkspaceError::RepoNotFound {
            repo: name.to_string(),
            root: root.to_path_buf(),
        });
    }
    if !has_git_metadata(&path) {
        return Err(WorkspaceError::NotAGitRepo { path });
    }
    Ok(Repo {
        name: name.to_string(),
        path,
    })
}

/// Every immediate subdirectory of `root` that carries git metadata,
/// excluding `worktree_root`, hidden directories and well-known tool dirs.
pub fn scan(root: &Path, worktree_root: &Path) -> Result<Vec<Repo>, WorkspaceError> {
    let entries = std::fs::read_dir(root).map_err(|e| WorkspaceError::io(root, e))?;

    let mut repos = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| WorkspaceError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() || paths_equal(&path, worktree_root) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
            continue;
        }
        if has_git_metadata(&path) {
            repos.push(Repo { name, path });
        }
    }

    repos.sort();
    debug!(root = %root.display(), count = repos.len(), "scanned for repos");
    Ok(repos)
}

/// Candidate repos for a command: the allow-list if one is configured,
/// otherwise a scan of the root.
///
/// Any allow-listed name without a directory fails with `RepoNotFound`,
/// one without git metadata with `NotAGitRepo`. The worktree root is never
/// a candidate.
pub fn discover(
    root: &Path,
    worktree_root: &Path,
    allow_list: &[String],
) -> Result<Vec<Repo>, WorkspaceError> {
    if allow_list.is_empty() {
        return scan(root, worktree_root);
    }

    let mut repos = Vec::new();
    for name in allow_list {
        let repo = open(root, name)?;
        if paths_equal(&repo.path, worktree_root) {
            continue;
        }
        if !repos.contains(&repo) {
            repos.push(repo);
        }
    }
    repos.sort();
    Ok(repos)
}

/// Resolve the repos named on the command line against the discovered set.
///
/// Errors are returned per name so a command can proceed with the valid ones.
pub fn select(
    root: &Path,
    known: &[Repo],
    names: &[String],
) -> Vec<(String, Result<Repo, WorkspaceError>)> {
    names
        .iter()
        .map(|name| {
            let result = match known.iter().find(|repo| &repo.name == name) {
                Some(repo) => Ok(repo.clone()),
                None => open(root, name).and_then(|_| {
                    Err(WorkspaceError::RepoNotFound {
                        repo: name.clone(),
                        root: root.to_path_buf(),
                    })
                }),
            };
            (name.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_repo;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_scan_finds_git_dirs_and_skips_worktree_root() {
        let dir = tempdir().unwrap();
        init_repo(&dir.path().join("web"));
        init_repo(&dir.path().join("api"));
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        init_repo(&dir.path().join("_wt"));
        init_repo(&dir.path().join(".hidden"));

        let repos = scan(dir.path(), &dir.path().join("_wt")).unwrap();
        let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
    }

    #[test]
    fn test_discover_allow_list_missing_repo() {
        let dir = tempdir().unwrap();
        init_repo(&dir.path().join("api"));
        let err = discover(
            dir.path(),
            &dir.path().join("_wt"),
            &["api".to_string(), "web".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, WorkspaceError::RepoNotFound { ref repo, .. } if repo == "web"));
    }

    #[test]
    fn test_discover_allow_list_not_a_git_repo() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("plain")).unwrap();
        let err = discover(dir.path(), &dir.path().join("_wt"), &["plain".to_string()])
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::NotAGitRepo { .. }));
    }

    #[test]
    fn test_discover_allow_list_restricts_and_sorts() {
        let dir = tempdir().unwrap();
        init_repo(&dir.path().join("api"));
        init_repo(&dir.path().join("web"));
        init_repo(&dir.path().join("ops"));
        let repos = discover(
            dir.path(),
            &dir.path().join("_wt"),
            &["web".to_string(), "api".to_string(), "web".to_string()],
        )
        .unwrap();
        let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
    }

    #[test]
    fn test_select_reports_per_name() {
        let dir = tempdir().unwrap();
        init_repo(&dir.path().join("api"));
        init_repo(&dir.path().join("ops"));
        fs::create_dir_all(dir.path().join("plain")).unwrap();
        let known = vec![open(dir.path(), "api").unwrap()];

        let selected = select(
            dir.path(),
            &known,
            &["api".to_string(), "plain".to_string(), "ops".to_string()],
        );
        assert!(selected[0].1.is_ok());
        assert!(matches!(
            selected[1].1,
            Err(WorkspaceError::NotAGitRepo { .. })
        ));
        // Present on disk but excluded by the allow-list.
        assert!(matches!(
            selected[2].1,
            Err(WorkspaceError::RepoNotFound { .. })
        ));
    }
}
