//! Feature registry derived from the worktree root on every call.
//!
//! There is no index file: a feature exists iff `<worktree_root>/<feature>/`
//! exists and holds at least one repo directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::WorkspaceError;
use crate::util::is_hidden;

/// Whether `name` is a usable feature slug: ASCII letters, digits, `-`, `_`.
pub fn is_valid_feature_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn validate_feature_name(name: &str) -> Result<(), WorkspaceError> {
    if is_valid_feature_name(name) {
        Ok(())
    } else {
        Err(WorkspaceError::InvalidFeatureName {
            name: name.to_string(),
        })
    }
}

/// An existing feature workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub dir: PathBuf,
    /// Names of the repo directories under `dir`, sorted.
    pub entry_dirs: Vec<String>,
}

/// Stateless view over `<worktree_root>`.
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    worktree_root: PathBuf,
}

impl FeatureRegistry {
    pub fn new(worktree_root: impl Into<PathBuf>) -> Self {
        Self {
            worktree_root: worktree_root.into(),
        }
    }

    /// All existing features, sorted by name.
    pub fn list(&self) -> Result<Vec<String>, WorkspaceError> {
        let entries = match fs::read_dir(&self.worktree_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::io(&self.worktree_root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WorkspaceError::io(&self.worktree_root, e))?;
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !path.is_dir() || is_hidden(&name) || !is_valid_feature_name(&name) {
                continue;
            }
            if !entry_dirs(&path)?.is_empty() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Look up one feature. Fails with `FeatureNotFound` if its directory is
    /// absent or holds no repo directories.
    pub fn resolve(&self, name: &str) -> Result<Feature, WorkspaceError> {
        validate_feature_name(name)?;
        let dir = self.worktree_root.join(name);
        let not_found = || WorkspaceError::FeatureNotFound {
            feature: name.to_string(),
            path: dir.clone(),
        };
        if !dir.is_dir() {
            return Err(not_found());
        }
        let entry_dirs = entry_dirs(&dir)?;
        if entry_dirs.is_empty() {
            return Err(not_found());
        }
        Ok(Feature {
            name: name.to_string(),
            dir,
            entry_dirs,
        })
    }
}

/// Non-hidden subdirectory names of a feature directory, sorted.
pub fn entry_dirs(feature_dir: &Path) -> Result<Vec<String>, WorkspaceError> {
    let entries = match fs::read_dir(feature_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WorkspaceError::io(feature_dir, e)),
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| !is_hidden(name))
        .collect();
    names.sort();
    Ok(names)
}
