//! Feature worktree lifecycle: create, add, remove and status.
//!
//! Every mutating call holds the feature's [`FeatureLock`] and processes
//! repos independently, collecting one [`RepoOutcome`] per repo instead of
//! stopping at the first failure. State is always re-derived from the
//! filesystem and git; nothing is cached between calls.

pub mod local_files;
pub mod lock;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ResolvedConfig;
use crate::errors::WorkspaceError;
use crate::git::{self, GitRepo, LinkedWorktree};
use crate::registry::{self, FeatureRegistry};
use crate::repos::{self, Repo};
use crate::util::paths_equal;
use crate::workspace_file;

pub use local_files::CopyReport;
pub use lock::{DEFAULT_LOCK_TIMEOUT, FeatureLock};

/// Reconciled state of one repo's worktree within a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeState {
    /// Directory exists and git recognizes it as a linked worktree.
    Active,
    /// Directory exists but git does not recognize it.
    Missing,
    /// Git has worktree metadata but the directory is gone.
    Orphaned,
}

impl fmt::Display for WorktreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorktreeState::Active => write!(f, "active"),
            WorktreeState::Missing => write!(f, "missing"),
            WorktreeState::Orphaned => write!(f, "orphaned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub repo: String,
    pub path: PathBuf,
    pub branch: String,
    pub state: WorktreeState,
    /// Uncommitted changes; only computed for active entries.
    pub dirty: Option<bool>,
    /// Git's administrative name for the worktree, when git knows it.
    pub worktree_name: Option<String>,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureStatus {
    pub feature: String,
    pub dir: PathBuf,
    /// Sorted by repo name.
    pub entries: Vec<WorktreeEntry>,
}

impl FeatureStatus {
    pub fn active_repos(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.state == WorktreeState::Active)
            .map(|e| e.repo.as_str())
            .collect()
    }

    pub fn entry(&self, repo: &str) -> Option<&WorktreeEntry> {
        self.entries.iter().find(|e| e.repo == repo)
    }
}

/// What a mutating operation did for one repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoAction {
    Created {
        branch_created: bool,
        local_files: Option<CopyReport>,
    },
    /// Already a worktree on the expected branch; nothing changed.
    AlreadyPresent,
    Removed,
    /// Stale git metadata for a deleted directory was cleaned up.
    Pruned,
}

#[derive(Debug)]
pub struct RepoOutcome {
    pub repo: String,
    pub result: Result<RepoAction, WorkspaceError>,
}

/// Per-repo results of one create/add/remove call.
#[derive(Debug)]
pub struct OperationReport {
    pub feature: String,
    pub outcomes: Vec<RepoOutcome>,
    /// Regenerated workspace file, unless the feature directory was deleted.
    pub workspace_file: Option<PathBuf>,
    pub feature_removed: bool,
}

impl OperationReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &WorkspaceError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.repo.as_str(), e)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Repos to remove; empty means every entry of the feature.
    pub repos: Vec<String>,
    /// Remove dirty or locked worktrees and non-empty broken directories.
    pub force: bool,
}

pub struct WorktreeManager<'a> {
    config: &'a ResolvedConfig,
    lock_timeout: Duration,
}

impl<'a> WorktreeManager<'a> {
    pub fn new(config: &'a ResolvedConfig) -> Self {
        Self {
            config,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn lock(&self, feature: &str) -> Result<FeatureLock, WorkspaceError> {
        FeatureLock::acquire(&self.config.worktree_root, feature, self.lock_timeout)
    }

    /// Create worktrees for `repos` under a (possibly new) feature.
    pub fn create(&self, feature: &str, repos: &[String]) -> Result<OperationReport, WorkspaceError> {
        registry::validate_feature_name(feature)?;
        let _lock = self.lock(feature)?;
        self.attach(feature, repos)
    }

    /// Like [`create`](Self::create), but the feature must already exist.
    pub fn add(&self, feature: &str, repos: &[String]) -> Result<OperationReport, WorkspaceError> {
        registry::validate_feature_name(feature)?;
        let _lock = self.lock(feature)?;
        FeatureRegistry::new(&self.config.worktree_root).resolve(feature)?;
        self.attach(feature, repos)
    }

    fn attach(&self, feature: &str, names: &[String]) -> Result<OperationReport, WorkspaceError> {
        let known = repos::discover(
            &self.config.root,
            &self.config.worktree_root,
            &self.config.repos,
        )?;

        let mut outcomes = Vec::new();
        for (name, repo) in repos::select(&self.config.root, &known, names) {
            let result = repo.and_then(|repo| self.attach_one(feature, &repo));
            if let Err(err) = &result {
                warn!(feature, repo = %name, error = %err, "failed to attach worktree");
            }
            outcomes.push(RepoOutcome { repo: name, result });
        }

        let (workspace_file, feature_removed) = self.finish(feature)?;
        Ok(OperationReport {
            feature: feature.to_string(),
            outcomes,
            workspace_file,
            feature_removed,
        })
    }

    fn attach_one(&self, feature: &str, repo: &Repo) -> Result<RepoAction, WorkspaceError> {
        let path = self.config.worktree_path(feature, &repo.name);
        let branch = self.config.branch_name(feature);
        let conflict = |reason: String| WorkspaceError::Conflict {
            feature: feature.to_string(),
            repo: repo.name.clone(),
            path: path.clone(),
            reason,
        };

        let git = GitRepo::open(&repo.path).map_err(|e| WorkspaceError::git(&repo.name, e))?;
        let worktrees = git.worktrees().map_err(|e| WorkspaceError::git(&repo.name, e))?;

        if path.exists() {
            return match worktrees.iter().find(|wt| paths_equal(&wt.path, &path)) {
                Some(wt) if wt.valid && wt.branch.as_deref() == Some(branch.as_str()) => {
                    debug!(feature, repo = %repo.name, "worktree already present");
                    Ok(RepoAction::AlreadyPresent)
                }
                Some(wt) if wt.valid => Err(conflict(format!(
                    "worktree is on '{}', expected '{branch}'",
                    wt.branch.as_deref().unwrap_or("a detached HEAD")
                ))),
                _ => Err(conflict(format!(
                    "path exists but is not a git worktree of '{}'",
                    repo.name
                ))),
            };
        }

        // Metadata left behind by a deleted directory would block the add.
        for stale in worktrees
            .iter()
            .filter(|wt| !wt.path_exists() && paths_equal(&wt.path, &path))
        {
            git.prune_stale(&stale.name)
                .map_err(|e| WorkspaceError::git(&repo.name, e))?;
        }
        let worktrees = git.worktrees().map_err(|e| WorkspaceError::git(&repo.name, e))?;
        let name = free_worktree_name(&worktrees, feature);

        let feature_dir = self.config.feature_dir(feature);
        fs::create_dir_all(&feature_dir).map_err(|e| WorkspaceError::io(&feature_dir, e))?;

        let branch_created = git
            .ensure_branch(&branch)
            .map_err(|e| WorkspaceError::git(&repo.name, e))?;
        git.add_worktree(&name, &path, &branch)
            .map_err(|e| WorkspaceError::git(&repo.name, e))?;
        info!(feature, repo = %repo.name, branch = %branch, branch_created, "created worktree");

        let local = &self.config.local_files;
        let local_files = local.enabled.then(|| {
            local_files::copy_local_files(
                &repo.path,
                &path,
                &local.rules_for(&repo.name),
                local.overwrite,
            )
        });

        Ok(RepoAction::Created {
            branch_created,
            local_files,
        })
    }

    /// Remove worktrees of a feature, deleting the feature directory once
    /// nothing of value is left in it.
    pub fn remove(
        &self,
        feature: &str,
        opts: &RemoveOptions,
    ) -> Result<OperationReport, WorkspaceError> {
        registry::validate_feature_name(feature)?;
        let lock = self.lock(feature)?;

        let status = self.reconcile(feature)?;
        if !status.dir.exists() && status.entries.is_empty() {
            return Err(WorkspaceError::FeatureNotFound {
                feature: feature.to_string(),
                path: status.dir,
            });
        }

        let mut outcomes = Vec::new();
        if opts.repos.is_empty() {
            for entry in &status.entries {
                outcomes.push(RepoOutcome {
                    repo: entry.repo.clone(),
                    result: self.remove_one(feature, entry, opts.force),
                });
            }
        } else {
            for name in &opts.repos {
                let result = match status.entry(name) {
                    Some(entry) => self.remove_one(feature, entry, opts.force),
                    None => Err(WorkspaceError::RepoNotFound {
                        repo: name.clone(),
                        root: status.dir.clone(),
                    }),
                };
                outcomes.push(RepoOutcome {
                    repo: name.clone(),
                    result,
                });
            }
        }
        for outcome in &outcomes {
            if let Err(err) = &outcome.result {
                warn!(feature, repo = %outcome.repo, error = %err, "failed to remove worktree");
            }
        }

        let (workspace_file, feature_removed) = self.finish(feature)?;
        // The feature is gone; its lock file goes with it.
        if !status.dir.exists() {
            lock.delete_file()?;
        }
        Ok(OperationReport {
            feature: feature.to_string(),
            outcomes,
            workspace_file,
            feature_removed,
        })
    }

    fn remove_one(
        &self,
        feature: &str,
        entry: &WorktreeEntry,
        force: bool,
    ) -> Result<RepoAction, WorkspaceError> {
        let repo_name = entry.repo.as_str();
        let conflict = |reason: &str| WorkspaceError::Conflict {
            feature: feature.to_string(),
            repo: repo_name.to_string(),
            path: entry.path.clone(),
            reason: reason.to_string(),
        };
        let source = self.config.root.join(repo_name);

        match entry.state {
            WorktreeState::Active => {
                let dirty = git::is_dirty(&entry.path).map_err(|e| WorkspaceError::git(repo_name, e))?;
                if dirty && !force {
                    return Err(WorkspaceError::DirtyWorktree {
                        feature: feature.to_string(),
                        repo: repo_name.to_string(),
                        path: entry.path.clone(),
                    });
                }
                if entry.locked && !force {
                    return Err(conflict("worktree is locked; pass --force to remove it"));
                }
                let name = entry
                    .worktree_name
                    .as_deref()
                    .ok_or_else(|| conflict("git worktree name unknown"))?;
                let git = GitRepo::open(&source).map_err(|e| WorkspaceError::git(repo_name, e))?;
                git.remove_worktree(name, force)
                    .map_err(|e| WorkspaceError::git(repo_name, e))?;
                remove_dir_if_present(&entry.path)?;
                Ok(RepoAction::Removed)
            }
            WorktreeState::Missing => {
                if !force && !is_empty_dir(&entry.path) {
                    return Err(conflict(
                        "directory is not a git worktree and is not empty; pass --force to delete it",
                    ));
                }
                remove_dir_if_present(&entry.path)?;
                if let Some(name) = &entry.worktree_name
                    && let Ok(git) = GitRepo::open(&source)
                {
                    git.prune_stale(name)
                        .map_err(|e| WorkspaceError::git(repo_name, e))?;
                }
                info!(feature, repo = repo_name, path = %entry.path.display(), "removed broken worktree directory");
                Ok(RepoAction::Removed)
            }
            WorktreeState::Orphaned => {
                let name = entry
                    .worktree_name
                    .as_deref()
                    .ok_or_else(|| conflict("git worktree name unknown"))?;
                let git = GitRepo::open(&source).map_err(|e| WorkspaceError::git(repo_name, e))?;
                if git.prune_stale(name).map_err(|e| WorkspaceError::git(repo_name, e))? {
                    return Ok(RepoAction::Pruned);
                }
                if !force {
                    return Err(conflict(
                        "stale worktree metadata is locked; pass --force to prune it",
                    ));
                }
                git.remove_worktree(name, true)
                    .map_err(|e| WorkspaceError::git(repo_name, e))?;
                Ok(RepoAction::Pruned)
            }
        }
    }

    /// Reconciled per-repo state of an existing feature. Read-only.
    pub fn status(&self, feature: &str) -> Result<FeatureStatus, WorkspaceError> {
        registry::validate_feature_name(feature)?;
        let dir = self.config.feature_dir(feature);
        if !dir.is_dir() {
            return Err(WorkspaceError::FeatureNotFound {
                feature: feature.to_string(),
                path: dir,
            });
        }
        self.reconcile(feature)
    }

    fn reconcile(&self, feature: &str) -> Result<FeatureStatus, WorkspaceError> {
        let dir = self.config.feature_dir(feature);
        let branch = self.config.branch_name(feature);

        let mut names = registry::entry_dirs(&dir)?;
        let known = self.spanned_repos(&names)?;

        // Candidate names: directories on disk plus repos with metadata
        // pointing into this feature.
        let mut worktrees_by_repo: Vec<(String, Vec<LinkedWorktree>)> = Vec::new();
        for repo in &known {
            let Ok(git) = GitRepo::open(&repo.path) else {
                continue;
            };
            let worktrees = git.worktrees().unwrap_or_default();
            let target = dir.join(&repo.name);
            if worktrees.iter().any(|wt| paths_equal(&wt.path, &target)) && !names.contains(&repo.name) {
                names.push(repo.name.clone());
            }
            worktrees_by_repo.push((repo.name.clone(), worktrees));
        }
        names.sort();

        let mut entries = Vec::new();
        for name in names {
            let path = dir.join(&name);
            let registered = worktrees_by_repo
                .iter()
                .find(|(repo, _)| repo == &name)
                .and_then(|(_, worktrees)| worktrees.iter().find(|wt| paths_equal(&wt.path, &path)));

            let state = match registered {
                Some(wt) if path.is_dir() && wt.valid => WorktreeState::Active,
                _ if path.is_dir() => WorktreeState::Missing,
                Some(_) => WorktreeState::Orphaned,
                None => continue,
            };
            let dirty = (state == WorktreeState::Active)
                .then(|| git::is_dirty(&path).ok())
                .flatten();
            entries.push(WorktreeEntry {
                repo: name,
                branch: registered
                    .and_then(|wt| wt.branch.clone())
                    .unwrap_or_else(|| branch.clone()),
                state,
                dirty,
                worktree_name: registered.map(|wt| wt.name.clone()),
                locked: registered.is_some_and(|wt| wt.locked),
                path,
            });
        }

        Ok(FeatureStatus {
            feature: feature.to_string(),
            dir,
            entries,
        })
    }

    /// Repos that may hold worktrees of a feature: every repo under the root,
    /// the allow-list, and the repo behind each entry directory. The
    /// allow-list only narrows what new commands attach to.
    fn spanned_repos(&self, entry_names: &[String]) -> Result<Vec<Repo>, WorkspaceError> {
        let root = &self.config.root;
        let mut known = repos::scan(root, &self.config.worktree_root)?;
        let allowed = repos::discover(root, &self.config.worktree_root, &self.config.repos)
            .unwrap_or_default();
        let entries = entry_names
            .iter()
            .filter_map(|name| repos::open(root, name).ok());
        for repo in allowed.into_iter().chain(entries) {
            if !known.iter().any(|k| k.name == repo.name) {
                known.push(repo);
            }
        }
        Ok(known)
    }

    /// Regenerate the workspace file, or delete the feature directory when no
    /// active worktree and no other content remains.
    fn finish(&self, feature: &str) -> Result<(Option<PathBuf>, bool), WorkspaceError> {
        let dir = self.config.feature_dir(feature);
        let status = self.reconcile(feature)?;
        let active = status.active_repos();
        let workspace_path = workspace_file::workspace_file_path(&dir, feature);

        if active.is_empty() && !has_content(&dir, &workspace_path) {
            if !dir.exists() {
                return Ok((None, false));
            }
            fs::remove_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;
            info!(feature, path = %dir.display(), "removed feature directory");
            return Ok((None, true));
        }

        let path = workspace_file::generate(&dir, feature, &active)?;
        Ok((Some(path), false))
    }
}

/// `feature`, or `feature-N` if another worktree of the repo already uses it.
fn free_worktree_name(worktrees: &[LinkedWorktree], feature: &str) -> String {
    let taken = |name: &str| worktrees.iter().any(|wt| wt.name == name);
    if !taken(feature) {
        return feature.to_string();
    }
    (2..)
        .map(|n| format!("{feature}-{n}"))
        .find(|name| !taken(name))
        .unwrap_or_else(|| feature.to_string())
}

/// Whether `dir` holds any file other than `ignore`.
fn has_content(dir: &Path, ignore: &Path) -> bool {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| !entry.file_type().is_dir() && entry.path() != ignore)
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

fn remove_dir_if_present(path: &Path) -> Result<(), WorkspaceError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkspaceError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_repo;
    use tempfile::{TempDir, tempdir};

    struct Project {
        dir: TempDir,
        config: ResolvedConfig,
    }

    fn project(repos: &[&str]) -> Project {
        let dir = tempdir().unwrap();
        for repo in repos {
            init_repo(&dir.path().join(repo));
        }
        let config = ResolvedConfig::from_layers(dir.path().to_path_buf(), Vec::new()).unwrap();
        Project { dir, config }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn head_branch(path: &Path) -> String {
        let repo = git2::Repository::open(path).unwrap();
        repo.head().unwrap().shorthand().unwrap().to_string()
    }

    fn workspace_folders(path: &Path) -> Vec<String> {
        let file: workspace_file::WorkspaceFile =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        file.folders.into_iter().map(|f| f.path).collect()
    }

    #[test]
    fn test_create_two_repos_scenario() {
        let p = project(&["api", "web"]);
        let manager = WorktreeManager::new(&p.config);

        let report = manager.create("auth", &names(&["api", "web"])).unwrap();
        assert!(!report.has_failures());
        for outcome in &report.outcomes {
            assert!(matches!(
                outcome.result,
                Ok(RepoAction::Created {
                    branch_created: true,
                    local_files: None
                })
            ));
        }

        let wt_root = p.config.worktree_root.clone();
        assert_eq!(head_branch(&wt_root.join("auth/api")), "feat/auth");
        assert_eq!(head_branch(&wt_root.join("auth/web")), "feat/auth");

        let ws = report.workspace_file.unwrap();
        assert_eq!(ws, wt_root.join("auth/auth.code-workspace"));
        assert_eq!(workspace_folders(&ws), vec!["api", "web"]);
    }

    #[test]
    fn test_create_is_idempotent() {
        let p = project(&["api", "web"]);
        let manager = WorktreeManager::new(&p.config);
        let first = manager.create("auth", &names(&["api", "web"])).unwrap();
        let ws = first.workspace_file.unwrap();
        let before = fs::read_to_string(&ws).unwrap();

        let second = manager.create("auth", &names(&["api", "web"])).unwrap();
        assert!(
            second
                .outcomes
                .iter()
                .all(|o| matches!(o.result, Ok(RepoAction::AlreadyPresent)))
        );
        assert_eq!(fs::read_to_string(&ws).unwrap(), before);
    }

    #[test]
    fn test_create_conflicts_on_plain_directory_without_blocking_siblings() {
        let p = project(&["api", "web"]);
        let blocker = p.config.worktree_path("auth", "api");
        fs::create_dir_all(&blocker).unwrap();
        fs::write(blocker.join("notes.txt"), "keep me").unwrap();

        let manager = WorktreeManager::new(&p.config);
        let report = manager.create("auth", &names(&["api", "web"])).unwrap();

        assert!(report.has_failures());
        let api = &report.outcomes[0];
        assert!(matches!(api.result, Err(WorkspaceError::Conflict { .. })));
        assert!(matches!(
            report.outcomes[1].result,
            Ok(RepoAction::Created { .. })
        ));
        assert_eq!(
            fs::read_to_string(blocker.join("notes.txt")).unwrap(),
            "keep me"
        );
        assert_eq!(
            workspace_folders(&report.workspace_file.unwrap()),
            vec!["web"]
        );
    }

    #[test]
    fn test_create_conflicts_when_worktree_on_other_branch() {
        let p = project(&["api"]);
        let git = GitRepo::open(&p.dir.path().join("api")).unwrap();
        git.ensure_branch("other").unwrap();
        let path = p.config.worktree_path("auth", "api");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        git.add_worktree("auth", &path, "other").unwrap();

        let report = WorktreeManager::new(&p.config)
            .create("auth", &names(&["api"]))
            .unwrap();
        match &report.outcomes[0].result {
            Err(WorkspaceError::Conflict { reason, .. }) => assert!(reason.contains("other")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_create_unknown_repo_is_reported_per_repo() {
        let p = project(&["api"]);
        let report = WorktreeManager::new(&p.config)
            .create("auth", &names(&["api", "nope"]))
            .unwrap();
        assert!(report.outcomes[0].result.is_ok());
        assert!(matches!(
            report.outcomes[1].result,
            Err(WorkspaceError::RepoNotFound { .. })
        ));
    }

    #[test]
    fn test_create_invalid_feature_name() {
        let p = project(&["api"]);
        let err = WorktreeManager::new(&p.config)
            .create("../escape", &names(&["api"]))
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidFeatureName { .. }));
    }

    #[test]
    fn test_failed_create_leaves_no_feature_directory() {
        let p = project(&["api"]);
        let report = WorktreeManager::new(&p.config)
            .create("auth", &names(&["nope"]))
            .unwrap();
        assert!(report.has_failures());
        assert!(!p.config.feature_dir("auth").exists());
    }

    #[test]
    fn test_add_requires_existing_feature() {
        let p = project(&["api", "web", "ops"]);
        let manager = WorktreeManager::new(&p.config);
        assert!(matches!(
            manager.add("auth", &names(&["api"])),
            Err(WorkspaceError::FeatureNotFound { .. })
        ));

        manager.create("auth", &names(&["api"])).unwrap();
        let report = manager.add("auth", &names(&["web", "ops"])).unwrap();
        assert!(!report.has_failures());
        assert_eq!(
            workspace_folders(&report.workspace_file.unwrap()),
            vec!["api", "ops", "web"]
        );
    }

    #[test]
    fn test_status_reports_orphaned_after_manual_delete() {
        let p = project(&["api", "web"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api", "web"])).unwrap();

        fs::remove_dir_all(p.config.worktree_path("auth", "api")).unwrap();
        let status = manager.status("auth").unwrap();

        assert_eq!(
            status.entry("api").unwrap().state,
            WorktreeState::Orphaned
        );
        let web = status.entry("web").unwrap();
        assert_eq!(web.state, WorktreeState::Active);
        assert_eq!(web.branch, "feat/auth");
        assert_eq!(web.dirty, Some(false));
    }

    #[test]
    fn test_status_reports_missing_for_unrecognized_directory() {
        let p = project(&["api"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api"])).unwrap();
        fs::create_dir_all(p.config.worktree_path("auth", "stray")).unwrap();

        let status = manager.status("auth").unwrap();
        assert_eq!(status.entry("stray").unwrap().state, WorktreeState::Missing);
        assert_eq!(status.entry("stray").unwrap().dirty, None);
        assert_eq!(status.active_repos(), vec!["api"]);
    }

    #[test]
    fn test_status_unknown_feature() {
        let p = project(&["api"]);
        assert!(matches!(
            WorktreeManager::new(&p.config).status("ghost"),
            Err(WorkspaceError::FeatureNotFound { .. })
        ));
    }

    #[test]
    fn test_recreate_after_manual_delete_prunes_stale_metadata() {
        let p = project(&["api"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api"])).unwrap();
        fs::remove_dir_all(p.config.feature_dir("auth")).unwrap();

        let report = manager.create("auth", &names(&["api"])).unwrap();
        assert!(matches!(
            report.outcomes[0].result,
            Ok(RepoAction::Created {
                branch_created: false,
                ..
            })
        ));
        assert_eq!(
            manager.status("auth").unwrap().entry("api").unwrap().state,
            WorktreeState::Active
        );
    }

    #[test]
    fn test_remove_all_deletes_feature() {
        let p = project(&["api", "web"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api", "web"])).unwrap();

        let report = manager.remove("auth", &RemoveOptions::default()).unwrap();
        assert!(!report.has_failures());
        assert!(report.feature_removed);
        assert!(!p.config.feature_dir("auth").exists());

        let registry = FeatureRegistry::new(&p.config.worktree_root);
        assert!(registry.list().unwrap().is_empty());
        let git = GitRepo::open(&p.dir.path().join("api")).unwrap();
        assert!(git.worktrees().unwrap().is_empty());
    }

    #[test]
    fn test_remove_all_deletes_lock_file() {
        let p = project(&["api"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api"])).unwrap();
        let lock_path = FeatureLock::path_for(&p.config.worktree_root, "auth");
        assert!(lock_path.exists());

        let opts = RemoveOptions {
            repos: Vec::new(),
            force: false,
        };
        manager.remove("auth", &opts).unwrap();
        assert!(!lock_path.exists());
        // A later create takes the lock again from scratch.
        manager.create("auth", &names(&["api"])).unwrap();
        assert!(lock_path.exists());
    }

    #[test]
    fn test_remove_subset_keeps_lock_file() {
        let p = project(&["api", "web"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api", "web"])).unwrap();

        let opts = RemoveOptions {
            repos: names(&["web"]),
            force: false,
        };
        manager.remove("auth", &opts).unwrap();
        assert!(FeatureLock::path_for(&p.config.worktree_root, "auth").exists());
    }

    #[test]
    fn test_status_sees_worktrees_outside_narrowed_allow_list() {
        let mut p = project(&["api", "web"]);
        WorktreeManager::new(&p.config)
            .create("auth", &names(&["api", "web"]))
            .unwrap();
        p.config.repos = names(&["api"]);
        let manager = WorktreeManager::new(&p.config);

        let status = manager.status("auth").unwrap();
        assert_eq!(status.entry("web").unwrap().state, WorktreeState::Active);
        assert_eq!(status.active_repos(), vec!["api", "web"]);

        let opts = RemoveOptions {
            repos: names(&["web"]),
            force: true,
        };
        let report = manager.remove("auth", &opts).unwrap();
        assert!(matches!(report.outcomes[0].result, Ok(RepoAction::Removed)));
        let git = GitRepo::open(&p.dir.path().join("web")).unwrap();
        assert!(git.worktrees().unwrap().is_empty());
    }

    #[test]
    fn test_status_sees_orphan_outside_narrowed_allow_list() {
        let mut p = project(&["api", "web"]);
        WorktreeManager::new(&p.config)
            .create("auth", &names(&["api", "web"]))
            .unwrap();
        fs::remove_dir_all(p.config.worktree_path("auth", "web")).unwrap();
        p.config.repos = names(&["api"]);

        let status = WorktreeManager::new(&p.config).status("auth").unwrap();
        assert_eq!(status.entry("web").unwrap().state, WorktreeState::Orphaned);
    }

    #[test]
    fn test_create_keeps_stale_metadata_for_other_path() {
        let p = project(&["api"]);
        let git = GitRepo::open(&p.dir.path().join("api")).unwrap();
        let scratch = p.dir.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        git.ensure_branch("spike").unwrap();
        git.add_worktree("auth", &scratch.join("auth"), "spike").unwrap();
        fs::remove_dir_all(&scratch).unwrap();

        let manager = WorktreeManager::new(&p.config);
        let report = manager.create("auth", &names(&["api"])).unwrap();
        assert!(!report.has_failures());

        let worktrees = git.worktrees().unwrap();
        let stale = worktrees.iter().find(|wt| wt.name == "auth").unwrap();
        assert!(!stale.path_exists());
        let created = worktrees
            .iter()
            .find(|wt| paths_equal(&wt.path, &p.config.worktree_path("auth", "api")))
            .unwrap();
        assert_eq!(created.name, "auth-2");
        assert!(created.valid);
    }

    #[test]
    fn test_remove_subset_regenerates_workspace_file() {
        let p = project(&["api", "web"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api", "web"])).unwrap();

        let opts = RemoveOptions {
            repos: names(&["web"]),
            force: false,
        };
        let report = manager.remove("auth", &opts).unwrap();
        assert!(!report.feature_removed);
        assert_eq!(
            workspace_folders(&report.workspace_file.unwrap()),
            vec!["api"]
        );
        assert!(!p.config.worktree_path("auth", "web").exists());
    }

    #[test]
    fn test_remove_refuses_dirty_worktree_unless_forced() {
        let p = project(&["api"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api"])).unwrap();
        let path = p.config.worktree_path("auth", "api");
        fs::write(path.join("wip.txt"), "unsaved").unwrap();

        let report = manager.remove("auth", &RemoveOptions::default()).unwrap();
        assert!(matches!(
            report.outcomes[0].result,
            Err(WorkspaceError::DirtyWorktree { .. })
        ));
        assert!(path.join("wip.txt").exists());

        let forced = RemoveOptions {
            force: true,
            ..Default::default()
        };
        let report = manager.remove("auth", &forced).unwrap();
        assert!(matches!(report.outcomes[0].result, Ok(RepoAction::Removed)));
        assert!(report.feature_removed);
    }

    #[test]
    fn test_remove_prunes_orphaned_entry() {
        let p = project(&["api", "web"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api", "web"])).unwrap();
        fs::remove_dir_all(p.config.worktree_path("auth", "api")).unwrap();

        let opts = RemoveOptions {
            repos: names(&["api"]),
            force: false,
        };
        let report = manager.remove("auth", &opts).unwrap();
        assert!(matches!(report.outcomes[0].result, Ok(RepoAction::Pruned)));
        let git = GitRepo::open(&p.dir.path().join("api")).unwrap();
        assert!(git.worktrees().unwrap().is_empty());
    }

    #[test]
    fn test_remove_broken_directory_needs_force_when_not_empty() {
        let p = project(&["api"]);
        let manager = WorktreeManager::new(&p.config);
        manager.create("auth", &names(&["api"])).unwrap();
        let stray = p.config.worktree_path("auth", "stray");
        fs::create_dir_all(&stray).unwrap();
        fs::write(stray.join("file.txt"), "x").unwrap();

        let opts = RemoveOptions {
            repos: names(&["stray"]),
            force: false,
        };
        let report = manager.remove("auth", &opts).unwrap();
        assert!(matches!(
            report.outcomes[0].result,
            Err(WorkspaceError::Conflict { .. })
        ));

        let opts = RemoveOptions {
            repos: names(&["stray"]),
            force: true,
        };
        let report = manager.remove("auth", &opts).unwrap();
        assert!(matches!(report.outcomes[0].result, Ok(RepoAction::Removed)));
        assert!(!stray.exists());
    }

    #[test]
    fn test_remove_unknown_feature() {
        let p = project(&["api"]);
        assert!(matches!(
            WorktreeManager::new(&p.config).remove("ghost", &RemoveOptions::default()),
            Err(WorkspaceError::FeatureNotFound { .. })
        ));
    }

    #[test]
    fn test_mutation_fails_fast_while_feature_locked() {
        let p = project(&["api"]);
        let _held =
            FeatureLock::acquire(&p.config.worktree_root, "auth", DEFAULT_LOCK_TIMEOUT).unwrap();

        let manager = WorktreeManager::new(&p.config).with_lock_timeout(Duration::from_millis(150));
        let err = manager.create("auth", &names(&["api"])).unwrap_err();
        assert!(matches!(err, WorkspaceError::ConcurrentOperation { .. }));
        // Other features are unaffected.
        manager.create("billing", &names(&["api"])).unwrap();
    }

    #[test]
    fn test_create_copies_local_files_when_enabled() {
        let mut p = project(&["api"]);
        fs::write(p.dir.path().join("api/.env"), "SECRET=1").unwrap();
        p.config.local_files.enabled = true;
        p.config.local_files.paths = names(&[".env"]);

        let report = WorktreeManager::new(&p.config)
            .create("auth", &names(&["api"]))
            .unwrap();
        match &report.outcomes[0].result {
            Ok(RepoAction::Created {
                local_files: Some(copy),
                ..
            }) => assert_eq!(copy.copied, vec![PathBuf::from(".env")]),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(p.config.worktree_path("auth", "api").join(".env")).unwrap(),
            "SECRET=1"
        );
    }

    #[test]
    fn test_free_worktree_name() {
        let wt = |name: &str| LinkedWorktree {
            name: name.to_string(),
            path: PathBuf::from("/x"),
            branch: None,
            valid: true,
            locked: false,
        };
        assert_eq!(free_worktree_name(&[], "auth"), "auth");
        assert_eq!(
            free_worktree_name(&[wt("auth"), wt("auth-2")], "auth"),
            "auth-3"
        );
    }
}
