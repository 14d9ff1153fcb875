use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::errors::ConfigError;
use crate::pal_config::{ConfigKey, ConfigLayer, LOCAL_CONFIG_FILE, LayerSource, Setting};

/// Environment variable that overrides the global config file location.
pub const GLOBAL_CONFIG_ENV: &str = "PAL_GLOBAL_CONFIG";

/// Codex sandbox scopes, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SandboxMode {
    ReadOnly,
    #[default]
    WorkspaceWrite,
    DangerFullAccess,
}

impl std::fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxMode::ReadOnly => write!(f, "read-only"),
            SandboxMode::WorkspaceWrite => write!(f, "workspace-write"),
            SandboxMode::DangerFullAccess => write!(f, "danger-full-access"),
        }
    }
}

impl std::str::FromStr for SandboxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "read-only" => Ok(SandboxMode::ReadOnly),
            "workspace-write" => Ok(SandboxMode::WorkspaceWrite),
            "danger-full-access" => Ok(SandboxMode::DangerFullAccess),
            _ => Err(format!(
                "Invalid sandbox '{s}'. Valid values: read-only, workspace-write, danger-full-access"
            )),
        }
    }
}

/// Codex approval policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    Untrusted,
    OnFailure,
    #[default]
    OnRequest,
    Never,
}

impl std::fmt::Display for ApprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalPolicy::Untrusted => write!(f, "untrusted"),
            ApprovalPolicy::OnFailure => write!(f, "on-failure"),
            ApprovalPolicy::OnRequest => write!(f, "on-request"),
            ApprovalPolicy::Never => write!(f, "never"),
        }
    }
}

impl std::str::FromStr for ApprovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "untrusted" => Ok(ApprovalPolicy::Untrusted),
            "on-failure" => Ok(ApprovalPolicy::OnFailure),
            "on-request" => Ok(ApprovalPolicy::OnRequest),
            "never" => Ok(ApprovalPolicy::Never),
            _ => Err(format!(
                "Invalid approval '{s}'. Valid values: untrusted, on-failure, on-request, never"
            )),
        }
    }
}

/// `[codex]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CodexSettings {
    pub command: String,
    pub sandbox: SandboxMode,
    pub approval: ApprovalPolicy,
    pub full_auto: bool,
    pub add_dirs: Vec<String>,
    pub extra_args: Vec<String>,
}

impl Default for CodexSettings {
    fn default() -> Self {
        Self {
            command: "codex".to_string(),
            sandbox: SandboxMode::default(),
            approval: ApprovalPolicy::default(),
            full_auto: false,
            add_dirs: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

/// `[claude]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaudeSettings {
    pub command: String,
    /// Permission mode injected for the `implement` intent. Empty disables it.
    pub permission_mode: String,
    /// Model passed as `--model` unless the caller supplies one. Empty disables it.
    pub model: String,
    pub add_dirs: Vec<String>,
    pub extra_args: Vec<String>,
    pub allow_bypass_permissions: bool,
}

impl Default for ClaudeSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            permission_mode: "acceptEdits".to_string(),
            model: String::new(),
            add_dirs: Vec::new(),
            extra_args: Vec::new(),
            allow_bypass_permissions: false,
        }
    }
}

/// `[agent]` section, shared by every agent CLI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSettings {
    pub add_dirs: Vec<String>,
}

/// Per-repo local-file rules, added to the shared ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoFileRules {
    pub paths: Vec<String>,
    pub patterns: Vec<String>,
}

/// `[local_files]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalFilesSettings {
    pub enabled: bool,
    pub overwrite: bool,
    pub paths: Vec<String>,
    pub patterns: Vec<String>,
    pub repos: BTreeMap<String, RepoFileRules>,
}

impl LocalFilesSettings {
    /// Shared rules plus the rules for `repo`, in that order.
    pub fn rules_for(&self, repo: &str) -> RepoFileRules {
        let mut rules = RepoFileRules {
            paths: self.paths.clone(),
            patterns: self.patterns.clone(),
        };
        if let Some(extra) = self.repos.get(repo) {
            rules.paths.extend(extra.paths.iter().cloned());
            rules.patterns.extend(extra.patterns.iter().cloned());
        }
        rules
    }
}

/// The fully merged configuration for one invocation.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub root: PathBuf,
    pub worktree_root: PathBuf,
    pub branch_prefix: String,
    /// Optional repo allow-list; empty means scan the root.
    pub repos: Vec<String>,
    /// Preferred editor command; empty means the launcher default.
    pub editor: String,
    pub codex: CodexSettings,
    pub claude: ClaudeSettings,
    pub agent: AgentSettings,
    pub local_files: LocalFilesSettings,
    /// Layers that contributed, lowest precedence first.
    pub layers: Vec<LayerSource>,
    /// Unknown-key warnings gathered from every layer.
    pub warnings: Vec<String>,
    pub local_config_path: PathBuf,
    pub global_config_path: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Built-in defaults rooted at `root`. This is the seed of the fold.
    pub fn defaults(root: PathBuf) -> Self {
        let local_config_path = root.join(LOCAL_CONFIG_FILE);
        Self {
            root,
            worktree_root: PathBuf::from("_wt"),
            branch_prefix: "feat".to_string(),
            repos: Vec::new(),
            editor: String::new(),
            codex: CodexSettings::default(),
            claude: ClaudeSettings::default(),
            agent: AgentSettings::default(),
            local_files: LocalFilesSettings::default(),
            layers: vec![LayerSource::Defaults],
            warnings: Vec::new(),
            local_config_path,
            global_config_path: None,
        }
    }

    /// Apply one setting, replacing whatever an earlier layer set for that key.
    pub fn apply(&mut self, setting: Setting) {
        match setting {
            Setting::Root(v) => self.root = v,
            Setting::WorktreeRoot(v) => self.worktree_root = v,
            Setting::BranchPrefix(v) => self.branch_prefix = v,
            Setting::Repos(v) => self.repos = v,
            Setting::Editor(v) => self.editor = v,
            Setting::CodexCommand(v) => self.codex.command = v,
            Setting::CodexSandbox(v) => self.codex.sandbox = v,
            Setting::CodexApproval(v) => self.codex.approval = v,
            Setting::CodexFullAuto(v) => self.codex.full_auto = v,
            Setting::CodexAddDirs(v) => self.codex.add_dirs = v,
            Setting::CodexExtraArgs(v) => self.codex.extra_args = v,
            Setting::ClaudeCommand(v) => self.claude.command = v,
            Setting::ClaudePermissionMode(v) => self.claude.permission_mode = v,
            Setting::ClaudeModel(v) => self.claude.model = v,
            Setting::ClaudeAddDirs(v) => self.claude.add_dirs = v,
            Setting::ClaudeExtraArgs(v) => self.claude.extra_args = v,
            Setting::ClaudeAllowBypassPermissions(v) => self.claude.allow_bypass_permissions = v,
            Setting::AgentAddDirs(v) => self.agent.add_dirs = v,
            Setting::LocalFilesEnabled(v) => self.local_files.enabled = v,
            Setting::LocalFilesOverwrite(v) => self.local_files.overwrite = v,
            Setting::LocalFilesPaths(v) => self.local_files.paths = v,
            Setting::LocalFilesPatterns(v) => self.local_files.patterns = v,
            Setting::LocalFilesRepos(v) => self.local_files.repos = v,
        }
    }

    /// Fold `layers` (lowest precedence first) over the defaults, then
    /// normalise paths. Pure apart from checking that the root exists.
    pub fn from_layers(seed_root: PathBuf, layers: Vec<ConfigLayer>) -> Result<Self, ConfigError> {
        let mut config = Self::defaults(seed_root);
        for layer in layers {
            debug!(source = %layer.source, keys = layer.settings.len(), "applying config layer");
            config.warnings.extend(layer.warnings);
            for (_, setting) in layer.settings {
                config.apply(setting);
            }
            config.layers.push(layer.source);
        }
        config.normalize_paths()?;
        Ok(config)
    }

    fn normalize_paths(&mut self) -> Result<(), ConfigError> {
        let root = expand_home(&self.root.to_string_lossy());
        if !root.is_dir() {
            return Err(ConfigError::RootNotFound { path: root });
        }
        self.root = root
            .canonicalize()
            .map_err(|_| ConfigError::RootNotFound { path: root.clone() })?;

        let worktree_root = expand_home(&self.worktree_root.to_string_lossy());
        self.worktree_root = if worktree_root.is_absolute() {
            normalize_lexically(&worktree_root)
        } else {
            normalize_lexically(&self.root.join(worktree_root))
        };
        Ok(())
    }

    pub fn feature_dir(&self, feature: &str) -> PathBuf {
        self.worktree_root.join(feature)
    }

    pub fn worktree_path(&self, feature: &str, repo: &str) -> PathBuf {
        self.feature_dir(feature).join(repo)
    }

    pub fn branch_name(&self, feature: &str) -> String {
        format!("{}/{}", self.branch_prefix, feature)
    }
}

/// Values given explicitly on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub worktree_root: Option<PathBuf>,
    pub branch_prefix: Option<String>,
    pub editor: Option<String>,
    pub copy_local: Option<bool>,
    pub overwrite_local: Option<bool>,
}

impl CliOverrides {
    /// The CLI as the highest-precedence layer. `cwd` anchors a relative `--root`.
    pub fn to_layer(&self, cwd: &Path) -> ConfigLayer {
        let mut layer = ConfigLayer::new(LayerSource::Cli);
        if let Some(root) = &self.root {
            let root = expand_home(&root.to_string_lossy());
            layer.set(Setting::Root(if root.is_absolute() {
                root
            } else {
                cwd.join(root)
            }));
        }
        if let Some(worktree_root) = &self.worktree_root {
            layer.set(Setting::WorktreeRoot(worktree_root.clone()));
        }
        if let Some(prefix) = &self.branch_prefix {
            layer.set(Setting::BranchPrefix(prefix.trim_matches('/').to_string()));
        }
        if let Some(editor) = &self.editor {
            layer.set(Setting::Editor(editor.clone()));
        }
        if let Some(copy) = self.copy_local {
            layer.set(Setting::LocalFilesEnabled(copy));
        }
        if let Some(overwrite) = self.overwrite_local {
            layer.set(Setting::LocalFilesOverwrite(overwrite));
        }
        layer
    }
}

/// Loads and merges configuration layers:
/// defaults → global file → local `.pal.toml` → CLI flags.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    cwd: PathBuf,
    global_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            global_path: global_config_path(),
        }
    }

    /// Replace the global config location (`None` disables the global layer).
    pub fn with_global_path(mut self, path: Option<PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    pub fn resolve(&self, overrides: &CliOverrides) -> Result<ResolvedConfig, ConfigError> {
        let cli = overrides.to_layer(&self.cwd);

        let global = match &self.global_path {
            Some(path) => ConfigLayer::load(path, LayerSource::Global(path.clone()))?,
            None => None,
        };

        // The local file lives in the root named on the CLI, else in the
        // root named by the global file, else in the working directory.
        let start_root = [Some(&cli), global.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|layer| match layer.get(ConfigKey::Root) {
                Some(Setting::Root(path)) => Some(path.clone()),
                _ => None,
            })
            .unwrap_or_else(|| self.cwd.clone());

        let local_path = expand_home(&start_root.to_string_lossy()).join(LOCAL_CONFIG_FILE);
        let local = ConfigLayer::load(&local_path, LayerSource::Local(local_path.clone()))?;

        let layers: Vec<ConfigLayer> = [global, local, Some(cli)].into_iter().flatten().collect();
        let mut config = ResolvedConfig::from_layers(self.cwd.clone(), layers)?;
        config.local_config_path = config.root.join(LOCAL_CONFIG_FILE);
        config.global_config_path = self.global_path.clone();
        Ok(config)
    }
}

/// `$PAL_GLOBAL_CONFIG`, else `<config dir>/pal/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(GLOBAL_CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("pal").join("config.toml"))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Remove `.` and resolve `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
