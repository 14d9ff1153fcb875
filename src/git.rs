//! Thin wrapper over `git2` for the worktree operations pal needs.
//!
//! Git is the source of truth for whether a directory is a linked worktree
//! and which branch it has checked out; nothing here caches that answer.

use std::path::{Path, PathBuf};

use git2::{
    BranchType, Repository, StatusOptions, WorktreeAddOptions, WorktreeLockStatus,
    WorktreePruneOptions,
};
use tracing::{debug, info};

/// Whether `path` carries git metadata (a `.git` directory or worktree file).
pub fn has_git_metadata(path: &Path) -> bool {
    path.join(".git").exists()
}

/// A linked worktree registered in a repository's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedWorktree {
    /// Administrative name under `.git/worktrees/`.
    pub name: String,
    pub path: PathBuf,
    /// Checked-out branch, when the working directory still exists.
    pub branch: Option<String>,
    /// Whether git considers the worktree metadata consistent.
    pub valid: bool,
    pub locked: bool,
}

impl LinkedWorktree {
    pub fn path_exists(&self) -> bool {
        self.path.is_dir()
    }
}

/// A primary checkout opened for worktree management.
pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    pub fn open(path: &Path) -> Result<Self, git2::Error> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.repo.find_branch(branch, BranchType::Local).is_ok()
    }

    /// Create `branch` from the current HEAD commit unless it already exists.
    /// Returns whether the branch was created.
    pub fn ensure_branch(&self, branch: &str) -> Result<bool, git2::Error> {
        if self.branch_exists(branch) {
            return Ok(false);
        }
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(branch, &head, false)?;
        debug!(branch, base = %head.id(), "created branch");
        Ok(true)
    }

    /// All linked worktrees known to this repository.
    pub fn worktrees(&self) -> Result<Vec<LinkedWorktree>, git2::Error> {
        let names = self.repo.worktrees()?;
        let mut out = Vec::new();
        for name in names.iter().flatten() {
            let worktree = match self.repo.find_worktree(name) {
                Ok(worktree) => worktree,
                Err(err) => {
                    debug!(name, error = %err, "skipping unreadable worktree entry");
                    continue;
                }
            };
            let path = worktree.path().to_path_buf();
            let valid = worktree.validate().is_ok();
            let locked = matches!(worktree.is_locked(), Ok(WorktreeLockStatus::Locked(_)));
            let branch = if valid && path.is_dir() {
                Repository::open_from_worktree(&worktree)
                    .ok()
                    .and_then(|repo| head_branch(&repo))
            } else {
                None
            };
            out.push(LinkedWorktree {
                name: name.to_string(),
                path,
                branch,
                valid,
                locked,
            });
        }
        Ok(out)
    }

    /// Drop metadata for `name` if its working directory is gone.
    /// Returns whether anything was pruned.
    pub fn prune_stale(&self, name: &str) -> Result<bool, git2::Error> {
        let Ok(worktree) = self.repo.find_worktree(name) else {
            return Ok(false);
        };
        if worktree.path().is_dir() || !worktree.is_prunable(None)? {
            return Ok(false);
        }
        worktree.prune(None)?;
        info!(name, "pruned stale worktree metadata");
        Ok(true)
    }

    /// Attach a new linked worktree named `name` at `path` with `branch` checked out.
    pub fn add_worktree(&self, name: &str, path: &Path, branch: &str) -> Result<(), git2::Error> {
        let reference = self
            .repo
            .find_branch(branch, BranchType::Local)?
            .into_reference();
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        self.repo.worktree(name, path, Some(&opts))?;
        info!(name, path = %path.display(), branch, "added worktree");
        Ok(())
    }

    /// Remove the linked worktree `name`, deleting its working directory.
    pub fn remove_worktree(&self, name: &str, force: bool) -> Result<(), git2::Error> {
        let worktree = self.repo.find_worktree(name)?;
        let path = worktree.path().to_path_buf();
        let mut opts = WorktreePruneOptions::new();
        opts.valid(true).locked(force).working_tree(true);
        worktree.prune(Some(&mut opts))?;
        info!(name, path = %path.display(), "removed worktree");
        Ok(())
    }
}

/// Short name of the branch checked out in `repo`, if HEAD is a branch.
fn head_branch(repo: &Repository) -> Option<String> {
    let head = repo.head().ok()?;
    if !head.is_branch() {
        return None;
    }
    head.shorthand().map(str::to_string)
}

/// Whether the working directory at `path` has staged, unstaged, or
/// untracked (non-ignored) changes.
pub fn is_dirty(path: &Path) -> Result<bool, git2::Error> {
    let repo = Repository::open(path)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .include_ignored(false)
        .recurse_untracked_dirs(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(!statuses.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_repo;
    use crate::util::paths_equal;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_branch_creates_once() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("api");
        init_repo(&repo_path);
        let git = GitRepo::open(&repo_path).unwrap();

        assert!(!git.branch_exists("feat/auth"));
        assert!(git.ensure_branch("feat/auth").unwrap());
        assert!(git.branch_exists("feat/auth"));
        assert!(!git.ensure_branch("feat/auth").unwrap());
    }

    #[test]
    fn test_add_and_list_worktree() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("api");
        init_repo(&repo_path);
        let git = GitRepo::open(&repo_path).unwrap();
        git.ensure_branch("feat/auth").unwrap();

        let wt_path = dir.path().join("_wt").join("auth").join("api");
        fs::create_dir_all(wt_path.parent().unwrap()).unwrap();
        git.add_worktree("auth", &wt_path, "feat/auth").unwrap();

        let found = git
            .worktrees()
            .unwrap()
            .into_iter()
            .find(|wt| paths_equal(&wt.path, &wt_path))
            .unwrap();
        assert_eq!(found.name, "auth");
        assert_eq!(found.branch.as_deref(), Some("feat/auth"));
        assert!(found.valid);
        assert!(!found.locked);
        assert!(wt_path.join("README.md").exists());
    }

    #[test]
    fn test_fresh_repo_has_no_linked_worktrees() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("api");
        init_repo(&repo_path);
        let git = GitRepo::open(&repo_path).unwrap();
        assert!(git.worktrees().unwrap().is_empty());
    }

    #[test]
    fn test_is_dirty_detects_untracked() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("api");
        init_repo(&repo_path);
        assert!(!is_dirty(&repo_path).unwrap());
        fs::write(repo_path.join("scratch.txt"), "wip").unwrap();
        assert!(is_dirty(&repo_path).unwrap());
    }

    #[test]
    fn test_prune_stale_after_manual_delete() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("api");
        init_repo(&repo_path);
        let git = GitRepo::open(&repo_path).unwrap();
        git.ensure_branch("feat/auth").unwrap();
        let wt_path = dir.path().join("_wt").join("auth").join("api");
        fs::create_dir_all(wt_path.parent().unwrap()).unwrap();
        git.add_worktree("auth", &wt_path, "feat/auth").unwrap();

        assert!(!git.prune_stale("auth").unwrap());
        fs::remove_dir_all(&wt_path).unwrap();
        assert!(git.prune_stale("auth").unwrap());
        assert!(git.worktrees().unwrap().is_empty());
    }

    #[test]
    fn test_remove_worktree_deletes_directory() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("api");
        init_repo(&repo_path);
        let git = GitRepo::open(&repo_path).unwrap();
        git.ensure_branch("feat/auth").unwrap();
        let wt_path = dir.path().join("_wt").join("auth").join("api");
        fs::create_dir_all(wt_path.parent().unwrap()).unwrap();
        git.add_worktree("auth", &wt_path, "feat/auth").unwrap();

        git.remove_worktree("auth", false).unwrap();
        assert!(!wt_path.exists());
        assert!(git.worktrees().unwrap().is_empty());
        // The branch survives worktree removal.
        assert!(git.branch_exists("feat/auth"));
    }
}
