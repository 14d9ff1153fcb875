//! Multi-root editor workspace descriptor (`<feature>.code-workspace`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::WorkspaceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub folders: Vec<WorkspaceFolder>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl WorkspaceFile {
    /// One folder per repo, relative to the feature directory.
    pub fn for_repos<S: AsRef<str>>(repos: &[S]) -> Self {
        Self {
            folders: repos
                .iter()
                .map(|repo| WorkspaceFolder {
                    path: repo.as_ref().to_string(),
                })
                .collect(),
            settings: serde_json::Map::new(),
        }
    }
}

pub fn workspace_file_path(feature_dir: &Path, feature: &str) -> PathBuf {
    feature_dir.join(format!("{feature}.code-workspace"))
}

/// Write (or overwrite) the workspace file listing `active_repos`.
pub fn generate<S: AsRef<str>>(
    feature_dir: &Path,
    feature: &str,
    active_repos: &[S],
) -> Result<PathBuf, WorkspaceError> {
    let path = workspace_file_path(feature_dir, feature);
    let file = WorkspaceFile::for_repos(active_repos);
    let mut json = serde_json::to_string_pretty(&file)
        .map_err(|e| WorkspaceError::io(&path, std::io::Error::other(e)))?;
    json.push('\n');

    fs::create_dir_all(feature_dir).map_err(|e| WorkspaceError::io(feature_dir, e))?;
    fs::write(&path, json).map_err(|e| WorkspaceError::io(&path, e))?;
    debug!(path = %path.display(), folders = file.folders.len(), "wrote workspace file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read(path: &Path) -> WorkspaceFile {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_generate_lists_repos_in_order() {
        let dir = tempdir().unwrap();
        let path = generate(dir.path(), "auth", &["api", "web"]).unwrap();
        assert_eq!(path, dir.path().join("auth.code-workspace"));

        let file = read(&path);
        let folders: Vec<_> = file.folders.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(folders, vec!["api", "web"]);
        assert!(file.settings.is_empty());
    }

    #[test]
    fn test_generate_overwrites_previous_listing() {
        let dir = tempdir().unwrap();
        generate(dir.path(), "auth", &["api", "web"]).unwrap();
        let path = generate(dir.path(), "auth", &["web"]).unwrap();
        assert_eq!(read(&path).folders.len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(WorkspaceFile::for_repos(&["api"])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "folders": [{ "path": "api" }], "settings": {} })
        );
    }
}
