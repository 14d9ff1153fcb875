//! Building guarded invocations of external coding-agent CLIs.
//!
//! [`build`] runs a fixed pipeline of stages over an argument draft:
//! writable roots, then agent guardrails, then intent defaults. Each stage
//! either adds arguments, drops redundant ones, or vetoes the whole
//! invocation. Configured `extra_args` and the caller's passthrough come
//! last in the final argv, so they win on everything except the locked
//! guardrail flags.
//!
//! Nothing here spawns a process; callers run the returned
//! [`AgentInvocationSpec`].

pub mod args;
mod claude;
mod codex;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::config::ResolvedConfig;
use crate::errors::InvocationError;

/// Environment variable naming the feature an agent runs in.
pub const FEATURE_ENV: &str = "PAL_FEATURE";
/// Environment variable holding the feature workspace path.
pub const WORKSPACE_ENV: &str = "PAL_WORKSPACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Codex,
    Claude,
}

impl AgentKind {
    /// Binary to launch, from config.
    pub fn command(self, config: &ResolvedConfig) -> &str {
        match self {
            AgentKind::Codex => &config.codex.command,
            AgentKind::Claude => &config.claude.command,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Codex => write!(f, "codex"),
            AgentKind::Claude => write!(f, "claude"),
        }
    }
}

impl FromStr for AgentKind {
    type Err = InvocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "codex" => Ok(AgentKind::Codex),
            "claude" => Ok(AgentKind::Claude),
            _ => Err(InvocationError::UnknownAgent {
                agent: s.to_string(),
            }),
        }
    }
}

/// Invocation mode selected by the `run`, `plan` and `implement` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Run,
    Plan,
    Implement,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Run => write!(f, "run"),
            Intent::Plan => write!(f, "plan"),
            Intent::Implement => write!(f, "implement"),
        }
    }
}

/// Everything needed to launch an agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocationSpec {
    pub agent: AgentKind,
    pub intent: Intent,
    pub cwd: PathBuf,
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl AgentInvocationSpec {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// Shell-like rendering for display; arguments with spaces are quoted.
    pub fn display_command(&self) -> String {
        self.argv
            .iter()
            .map(|arg| {
                if arg.is_empty() || arg.contains(char::is_whitespace) {
                    format!("'{}'", arg.replace('\'', r"'\''"))
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Inputs shared by every stage.
pub(crate) struct StageContext<'a> {
    pub config: &'a ResolvedConfig,
    pub workspace: &'a Path,
    pub intent: Intent,
}

/// The argument list under construction, kept in argv order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Draft {
    pub program: String,
    pub guardrails: Vec<String>,
    pub writable_roots: Vec<String>,
    pub intent_args: Vec<String>,
    pub extra_args: Vec<String>,
    pub passthrough: Vec<String>,
}

impl Draft {
    fn into_argv(self) -> Vec<String> {
        std::iter::once(self.program)
            .chain(self.guardrails)
            .chain(self.writable_roots)
            .chain(self.intent_args)
            .chain(self.extra_args)
            .chain(self.passthrough)
            .collect()
    }
}

pub(crate) type Stage = fn(Draft, &StageContext<'_>) -> Result<Draft, InvocationError>;

/// Build the invocation of `agent` for `intent` inside the feature workspace.
pub fn build(
    agent: AgentKind,
    intent: Intent,
    feature: &str,
    workspace: &Path,
    config: &ResolvedConfig,
    passthrough: &[String],
) -> Result<AgentInvocationSpec, InvocationError> {
    let (stages, extra_args) = match agent {
        AgentKind::Codex => (codex::STAGES, &config.codex.extra_args),
        AgentKind::Claude => (claude::STAGES, &config.claude.extra_args),
    };
    let ctx = StageContext {
        config,
        workspace,
        intent,
    };
    let draft = Draft {
        program: agent.command(config).to_string(),
        extra_args: extra_args.clone(),
        passthrough: passthrough.to_vec(),
        ..Default::default()
    };

    let draft = stages
        .iter()
        .try_fold(draft, |draft, stage| stage(draft, &ctx))?;
    let argv = draft.into_argv();
    debug!(%agent, %intent, ?argv, "built agent invocation");

    Ok(AgentInvocationSpec {
        agent,
        intent,
        cwd: workspace.to_path_buf(),
        argv,
        env: vec![
            (FEATURE_ENV.to_string(), feature.to_string()),
            (
                WORKSPACE_ENV.to_string(),
                workspace.to_string_lossy().into_owned(),
            ),
        ],
    })
}
