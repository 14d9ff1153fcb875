//! Configuration layers for pal.
//!
//! A layer is one source of settings (global file, local `.pal.toml`, or CLI
//! flags) flattened into a map from an enumerated [`ConfigKey`] to a typed
//! [`Setting`]. Layers are folded in precedence order by
//! [`crate::config::ConfigResolver`]; a key present in a higher layer fully
//! replaces the same key from a lower one, lists included.
//!
//! # Configuration File Format
//!
//! ```toml
//! root = "."
//! worktree_root = "_wt"
//! branch_prefix = "feat"
//! repos = ["api", "web"]
//! editor = "cursor"
//!
//! [codex]
//! sandbox = "workspace-write"
//! approval = "on-request"
//! full_auto = false
//!
//! [claude]
//! permission_mode = "acceptEdits"
//! model = "sonnet"
//! add_dirs = ["~/.cache/prisma"]
//! extra_args = []
//! allow_bypass_permissions = false
//!
//! [agent]
//! add_dirs = ["~/.npm"]
//!
//! [local_files]
//! enabled = true
//! overwrite = false
//! paths = [".env"]
//! patterns = ["**/.env*"]
//!
//! [local_files.repos.api]
//! paths = ["config/dev.local.toml"]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{ApprovalPolicy, RepoFileRules, SandboxMode, expand_home};
use crate::errors::ConfigError;

/// Name of the per-project config file inside the project root.
pub const LOCAL_CONFIG_FILE: &str = ".pal.toml";

/// Sections that hold nested keys.
const SECTIONS: [&str; 4] = ["codex", "claude", "agent", "local_files"];

/// Every key pal understands. Anything else in a config file is warned about
/// and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKey {
    Root,
    WorktreeRoot,
    BranchPrefix,
    Repos,
    Editor,
    CodexCommand,
    CodexSandbox,
    CodexApproval,
    CodexFullAuto,
    CodexAddDirs,
    CodexExtraArgs,
    ClaudeCommand,
    ClaudePermissionMode,
    ClaudeModel,
    ClaudeAddDirs,
    ClaudeExtraArgs,
    ClaudeAllowBypassPermissions,
    AgentAddDirs,
    LocalFilesEnabled,
    LocalFilesOverwrite,
    LocalFilesPaths,
    LocalFilesPatterns,
    LocalFilesRepos,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 23] = [
        ConfigKey::Root,
        ConfigKey::WorktreeRoot,
        ConfigKey::BranchPrefix,
        ConfigKey::Repos,
        ConfigKey::Editor,
        ConfigKey::CodexCommand,
        ConfigKey::CodexSandbox,
        ConfigKey::CodexApproval,
        ConfigKey::CodexFullAuto,
        ConfigKey::CodexAddDirs,
        ConfigKey::CodexExtraArgs,
        ConfigKey::ClaudeCommand,
        ConfigKey::ClaudePermissionMode,
        ConfigKey::ClaudeModel,
        ConfigKey::ClaudeAddDirs,
        ConfigKey::ClaudeExtraArgs,
        ConfigKey::ClaudeAllowBypassPermissions,
        ConfigKey::AgentAddDirs,
        ConfigKey::LocalFilesEnabled,
        ConfigKey::LocalFilesOverwrite,
        ConfigKey::LocalFilesPaths,
        ConfigKey::LocalFilesPatterns,
        ConfigKey::LocalFilesRepos,
    ];

    /// Dotted path of the key as written in TOML.
    pub fn path(self) -> &'static str {
        match self {
            ConfigKey::Root => "root",
            ConfigKey::WorktreeRoot => "worktree_root",
            ConfigKey::BranchPrefix => "branch_prefix",
            ConfigKey::Repos => "repos",
            ConfigKey::Editor => "editor",
            ConfigKey::CodexCommand => "codex.command",
            ConfigKey::CodexSandbox => "codex.sandbox",
            ConfigKey::CodexApproval => "codex.approval",
            ConfigKey::CodexFullAuto => "codex.full_auto",
            ConfigKey::CodexAddDirs => "codex.add_dirs",
            ConfigKey::CodexExtraArgs => "codex.extra_args",
            ConfigKey::ClaudeCommand => "claude.command",
            ConfigKey::ClaudePermissionMode => "claude.permission_mode",
            ConfigKey::ClaudeModel => "claude.model",
            ConfigKey::ClaudeAddDirs => "claude.add_dirs",
            ConfigKey::ClaudeExtraArgs => "claude.extra_args",
            ConfigKey::ClaudeAllowBypassPermissions => "claude.allow_bypass_permissions",
            ConfigKey::AgentAddDirs => "agent.add_dirs",
            ConfigKey::LocalFilesEnabled => "local_files.enabled",
            ConfigKey::LocalFilesOverwrite => "local_files.overwrite",
            ConfigKey::LocalFilesPaths => "local_files.paths",
            ConfigKey::LocalFilesPatterns => "local_files.patterns",
            ConfigKey::LocalFilesRepos => "local_files.repos",
        }
    }

    pub fn from_path(path: &str) -> Option<ConfigKey> {
        ConfigKey::ALL.into_iter().find(|key| key.path() == path)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// A typed value bound to its key.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    Root(PathBuf),
    WorktreeRoot(PathBuf),
    BranchPrefix(String),
    Repos(Vec<String>),
    Editor(String),
    CodexCommand(String),
    CodexSandbox(SandboxMode),
    CodexApproval(ApprovalPolicy),
    CodexFullAuto(bool),
    CodexAddDirs(Vec<String>),
    CodexExtraArgs(Vec<String>),
    ClaudeCommand(String),
    ClaudePermissionMode(String),
    ClaudeModel(String),
    ClaudeAddDirs(Vec<String>),
    ClaudeExtraArgs(Vec<String>),
    ClaudeAllowBypassPermissions(bool),
    AgentAddDirs(Vec<String>),
    LocalFilesEnabled(bool),
    LocalFilesOverwrite(bool),
    LocalFilesPaths(Vec<String>),
    LocalFilesPatterns(Vec<String>),
    LocalFilesRepos(BTreeMap<String, RepoFileRules>),
}

impl Setting {
    pub fn key(&self) -> ConfigKey {
        match self {
            Setting::Root(_) => ConfigKey::Root,
            Setting::WorktreeRoot(_) => ConfigKey::WorktreeRoot,
            Setting::BranchPrefix(_) => ConfigKey::BranchPrefix,
            Setting::Repos(_) => ConfigKey::Repos,
            Setting::Editor(_) => ConfigKey::Editor,
            Setting::CodexCommand(_) => ConfigKey::CodexCommand,
            Setting::CodexSandbox(_) => ConfigKey::CodexSandbox,
            Setting::CodexApproval(_) => ConfigKey::CodexApproval,
            Setting::CodexFullAuto(_) => ConfigKey::CodexFullAuto,
            Setting::CodexAddDirs(_) => ConfigKey::CodexAddDirs,
            Setting::CodexExtraArgs(_) => ConfigKey::CodexExtraArgs,
            Setting::ClaudeCommand(_) => ConfigKey::ClaudeCommand,
            Setting::ClaudePermissionMode(_) => ConfigKey::ClaudePermissionMode,
            Setting::ClaudeModel(_) => ConfigKey::ClaudeModel,
            Setting::ClaudeAddDirs(_) => ConfigKey::ClaudeAddDirs,
            Setting::ClaudeExtraArgs(_) => ConfigKey::ClaudeExtraArgs,
            Setting::ClaudeAllowBypassPermissions(_) => ConfigKey::ClaudeAllowBypassPermissions,
            Setting::AgentAddDirs(_) => ConfigKey::AgentAddDirs,
            Setting::LocalFilesEnabled(_) => ConfigKey::LocalFilesEnabled,
            Setting::LocalFilesOverwrite(_) => ConfigKey::LocalFilesOverwrite,
            Setting::LocalFilesPaths(_) => ConfigKey::LocalFilesPaths,
            Setting::LocalFilesPatterns(_) => ConfigKey::LocalFilesPatterns,
            Setting::LocalFilesRepos(_) => ConfigKey::LocalFilesRepos,
        }
    }

    /// Convert a raw TOML value into the setting for `key`.
    ///
    /// `base_dir` anchors a relative `root`. Problems that do not make the
    /// value unusable (unknown per-repo keys) are pushed onto `warnings`.
    pub fn parse(
        key: ConfigKey,
        value: &toml::Value,
        base_dir: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<Setting, String> {
        let setting = match key {
            ConfigKey::Root => {
                let raw = expand_home(&as_string(value)?);
                Setting::Root(if raw.is_absolute() {
                    raw
                } else {
                    base_dir.join(raw)
                })
            }
            ConfigKey::WorktreeRoot => Setting::WorktreeRoot(PathBuf::from(as_string(value)?)),
            ConfigKey::BranchPrefix => {
                let prefix = as_string(value)?;
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    return Err("branch prefix must not be empty".to_string());
                }
                Setting::BranchPrefix(prefix.to_string())
            }
            ConfigKey::Repos => Setting::Repos(as_string_list(value)?),
            ConfigKey::Editor => Setting::Editor(as_string(value)?),
            ConfigKey::CodexCommand => Setting::CodexCommand(as_command(value)?),
            ConfigKey::CodexSandbox => Setting::CodexSandbox(as_string(value)?.parse()?),
            ConfigKey::CodexApproval => Setting::CodexApproval(as_string(value)?.parse()?),
            ConfigKey::CodexFullAuto => Setting::CodexFullAuto(as_bool(value)?),
            ConfigKey::CodexAddDirs => Setting::CodexAddDirs(as_string_list(value)?),
            ConfigKey::CodexExtraArgs => Setting::CodexExtraArgs(as_string_list(value)?),
            ConfigKey::ClaudeCommand => Setting::ClaudeCommand(as_command(value)?),
            ConfigKey::ClaudePermissionMode => {
                Setting::ClaudePermissionMode(as_string(value)?.trim().to_string())
            }
            ConfigKey::ClaudeModel => Setting::ClaudeModel(as_string(value)?.trim().to_string()),
            ConfigKey::ClaudeAddDirs => Setting::ClaudeAddDirs(as_string_list(value)?),
            ConfigKey::ClaudeExtraArgs => Setting::ClaudeExtraArgs(as_string_list(value)?),
            ConfigKey::ClaudeAllowBypassPermissions => {
                Setting::ClaudeAllowBypassPermissions(as_bool(value)?)
            }
            ConfigKey::AgentAddDirs => Setting::AgentAddDirs(as_string_list(value)?),
            ConfigKey::LocalFilesEnabled => Setting::LocalFilesEnabled(as_bool(value)?),
            ConfigKey::LocalFilesOverwrite => Setting::LocalFilesOverwrite(as_bool(value)?),
            ConfigKey::LocalFilesPaths => Setting::LocalFilesPaths(as_string_list(value)?),
            ConfigKey::LocalFilesPatterns => Setting::LocalFilesPatterns(as_string_list(value)?),
            ConfigKey::LocalFilesRepos => Setting::LocalFilesRepos(as_repo_rules(value, warnings)?),
        };
        Ok(setting)
    }
}

fn as_string(value: &toml::Value) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("expected a string, found {}", value.type_str()))
}

fn as_command(value: &toml::Value) -> Result<String, String> {
    let command = as_string(value)?;
    let command = command.trim();
    if command.is_empty() {
        return Err("agent command must not be empty".to_string());
    }
    Ok(command.to_string())
}

fn as_bool(value: &toml::Value) -> Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("expected a boolean, found {}", value.type_str()))
}

fn as_string_list(value: &toml::Value) -> Result<Vec<String>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected an array of strings, found {}", value.type_str()))?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                format!(
                    "expected an array of strings, found an element of type {}",
                    item.type_str()
                )
            })
        })
        .collect()
}

fn as_repo_rules(
    value: &toml::Value,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<String, RepoFileRules>, String> {
    let table = value
        .as_table()
        .ok_or_else(|| format!("expected a table of repos, found {}", value.type_str()))?;

    let mut rules = BTreeMap::new();
    for (repo, entry) in table {
        let parsed = match entry {
            // A bare list is shorthand for `paths`.
            toml::Value::Array(_) => RepoFileRules {
                paths: as_string_list(entry).map_err(|e| format!("repos.{repo}: {e}"))?,
                patterns: Vec::new(),
            },
            toml::Value::Table(inner) => {
                let mut repo_rules = RepoFileRules::default();
                for (field, field_value) in inner {
                    match field.as_str() {
                        "paths" => {
                            repo_rules.paths = as_string_list(field_value)
                                .map_err(|e| format!("repos.{repo}.paths: {e}"))?
                        }
                        "patterns" => {
                            repo_rules.patterns = as_string_list(field_value)
                                .map_err(|e| format!("repos.{repo}.patterns: {e}"))?
                        }
                        other => warnings.push(format!(
                            "unknown key 'local_files.repos.{repo}.{other}' ignored"
                        )),
                    }
                }
                repo_rules
            }
            other => {
                return Err(format!(
                    "repos.{repo}: expected a table or an array, found {}",
                    other.type_str()
                ));
            }
        };
        rules.insert(repo.clone(), parsed);
    }
    Ok(rules)
}

/// Where a layer came from, lowest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    Defaults,
    Global(PathBuf),
    Local(PathBuf),
    Cli,
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSource::Defaults => write!(f, "built-in defaults"),
            LayerSource::Global(path) => write!(f, "global config {}", path.display()),
            LayerSource::Local(path) => write!(f, "local config {}", path.display()),
            LayerSource::Cli => write!(f, "command-line flags"),
        }
    }
}

/// One flattened configuration layer.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: LayerSource,
    pub settings: BTreeMap<ConfigKey, Setting>,
    /// Non-fatal problems (unknown keys) found while reading the layer.
    pub warnings: Vec<String>,
}

impl ConfigLayer {
    pub fn new(source: LayerSource) -> Self {
        Self {
            source,
            settings: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn set(&mut self, setting: Setting) {
        self.settings.insert(setting.key(), setting);
    }

    pub fn get(&self, key: ConfigKey) -> Option<&Setting> {
        self.settings.get(&key)
    }

    /// Load a layer from a TOML file. A missing file yields `Ok(None)`.
    pub fn load(path: &Path, source: LayerSource) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not present, skipping");
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let table: toml::Table =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        let layer = Self::from_table(&table, source, base_dir)?;
        for warning in &layer.warnings {
            warn!(file = %path.display(), "{warning}");
        }
        debug!(
            path = %path.display(),
            keys = layer.settings.len(),
            "loaded config layer"
        );
        Ok(Some(layer))
    }

    /// Flatten a parsed TOML table into a layer.
    pub fn from_table(
        table: &toml::Table,
        source: LayerSource,
        base_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let mut layer = Self::new(source);

        for (name, value) in table {
            if SECTIONS.contains(&name.as_str()) {
                let Some(section) = value.as_table() else {
                    return Err(layer.invalid(
                        name,
                        format!("expected a [{name}] table, found {}", value.type_str()),
                    ));
                };
                for (field, field_value) in section {
                    let path = format!("{name}.{field}");
                    layer.insert_raw(&path, field_value, base_dir)?;
                }
            } else {
                layer.insert_raw(name, value, base_dir)?;
            }
        }

        Ok(layer)
    }

    fn insert_raw(
        &mut self,
        path: &str,
        value: &toml::Value,
        base_dir: &Path,
    ) -> Result<(), ConfigError> {
        let Some(key) = ConfigKey::from_path(path) else {
            self.warnings.push(format!("unknown key '{path}' ignored"));
            return Ok(());
        };
        let mut warnings = Vec::new();
        let setting = Setting::parse(key, value, base_dir, &mut warnings)
            .map_err(|message| self.invalid(path, message))?;
        self.warnings.extend(warnings);
        self.set(setting);
        Ok(())
    }

    fn invalid(&self, key: &str, message: String) -> ConfigError {
        ConfigError::InvalidValue {
            layer: self.source.to_string(),
            key: key.to_string(),
            message,
        }
    }
}

/// Commented template written by `pal config init`.
pub fn local_config_template() -> &'static str {
    r#"# pal local configuration (TOML)
root = "."
worktree_root = "_wt"
branch_prefix = "feat"
# repos = ["repo1", "repo2"]
# editor = "cursor"

[codex]
sandbox = "workspace-write"
approval = "on-request"
full_auto = false
# add_dirs = []
# extra_args = []

[claude]
permission_mode = "acceptEdits"
# model = "sonnet"
# add_dirs = []
# extra_args = []
allow_bypass_permissions = false

[agent]
# Shared writable roots for all agent CLIs (Codex, Claude Code).
# add_dirs = ["~/.npm", "~/.cache/prisma"]

[local_files]
enabled = false
overwrite = false
# Paths are explicit repo-relative files:
# paths = ["backend/.env.prod.local"]
# Patterns are repo-relative globs (supports **):
# patterns = ["**/.env*", "**/.npmrc", "**/.envrc"]

# Per-repo additions:
# [local_files.repos.integrations]
# paths = ["apps/searcher/collections/.env"]
# patterns = ["apps/**/.npmrc"]
"#
}
