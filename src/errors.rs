//! Typed error hierarchy for pal.
//!
//! Three top-level enums cover the three concerns:
//! - `ConfigError`: unreadable, malformed, or invalid configuration layers
//! - `WorkspaceError`: repository discovery and worktree lifecycle failures
//! - `InvocationError`: agent invocations vetoed by a guardrail

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from loading and merging configuration layers. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for '{key}' in {layer}: {message}")]
    InvalidValue {
        layer: String,
        key: String,
        message: String,
    },

    #[error("Project root {path} does not exist or is not a directory")]
    RootNotFound { path: PathBuf },
}

/// Errors from repository discovery and the worktree lifecycle.
///
/// During multi-repo operations these are collected per repo rather than
/// aborting the whole command.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Repo '{repo}' not found under root {root}")]
    RepoNotFound { repo: String, root: PathBuf },

    #[error("{path} is not a git repository")]
    NotAGitRepo { path: PathBuf },

    #[error("No repositories found under {root}; put repos there or set repos = [...] in .pal.toml")]
    NoRepos { root: PathBuf },

    #[error("Feature workspace '{feature}' not found at {path}")]
    FeatureNotFound { feature: String, path: PathBuf },

    #[error(
        "Invalid feature name '{name}': use only letters, digits, '-' and '_' (and at least one character)"
    )]
    InvalidFeatureName { name: String },

    #[error("Conflict for {feature}/{repo} at {path}: {reason}")]
    Conflict {
        feature: String,
        repo: String,
        path: PathBuf,
        reason: String,
    },

    #[error(
        "Worktree {feature}/{repo} at {path} has uncommitted changes; commit or stash them, or pass --force"
    )]
    DirtyWorktree {
        feature: String,
        repo: String,
        path: PathBuf,
    },

    #[error(
        "Another pal command is modifying feature '{feature}' (lock not acquired after {waited:?}); retry once it finishes"
    )]
    ConcurrentOperation { feature: String, waited: Duration },

    #[error("Git error in repo '{repo}': {source}")]
    Git {
        repo: String,
        #[source]
        source: git2::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn git(repo: &str, source: git2::Error) -> Self {
        WorkspaceError::Git {
            repo: repo.to_string(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from building an agent invocation. Always fatal for the command:
/// a broadened write scope is never partially applied.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Unknown agent '{agent}'. Supported agents: codex, claude")]
    UnknownAgent { agent: String },

    #[error(
        "Sandbox guardrail: '{flag}' requests '{requested}' but the workspace is locked to '{locked}'. \
         Set [codex].sandbox = \"danger-full-access\" in .pal.toml to allow it"
    )]
    ScopeEscalation {
        flag: String,
        requested: String,
        locked: String,
    },

    #[error(
        "Sandbox guardrail: '{flag}' requests '{requested}', which conflicts with the locked sandbox '{locked}'"
    )]
    ScopeConflict {
        flag: String,
        requested: String,
        locked: String,
    },

    #[error(
        "Working-directory guardrail: '{flag}' would move the agent outside the feature workspace {workspace}"
    )]
    WorkingDirectoryOverride { flag: String, workspace: PathBuf },

    #[error(
        "Permission guardrail: '{flag}' requests bypass-permissions mode, which is disabled. \
         Set [claude].allow_bypass_permissions = true in .pal.toml to allow it"
    )]
    BypassPermissions { flag: String },

    #[error(
        "'{flag}' looks like a safety-relevant flag pal does not recognize; refusing to pass it through"
    )]
    UnrecognizedSafetyFlag { flag: String },

    #[error(
        "'pal plan <feature> codex' accepts only a planning prompt, got '{arg}'. \
         Use 'pal run <feature> codex ...' for Codex flags and subcommands"
    )]
    PlanPromptOnly { arg: String },

    #[error("Flag '{flag}' is missing its value")]
    MissingFlagValue { flag: String },
}
