use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pal::agent::Intent;
use pal::config::{CliOverrides, ConfigResolver, ResolvedConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "pal")]
#[command(version, about = "Feature workspaces across git repos, with guarded coding agents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Projects root holding the repo checkouts (default: config, else cwd)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Directory holding feature workspaces, relative to the root
    #[arg(long, global = true)]
    pub worktree_root: Option<PathBuf>,

    /// Prefix of feature branches (`<prefix>/<feature>`)
    #[arg(long, global = true)]
    pub branch_prefix: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check prerequisites and show where config is read from
    Doctor,
    /// List git repos under the root (or the configured allow-list)
    Repos,
    /// List feature workspaces
    Ls,
    /// Create a feature workspace with worktrees for the given repos
    New {
        /// Feature name (letters, digits, `-` and `_`)
        feature: String,
        /// Repo folder names under the root
        #[arg(required = true)]
        repos: Vec<String>,
        #[command(flatten)]
        local: LocalFileArgs,
    },
    /// Add repos to an existing feature workspace
    Add {
        feature: String,
        #[arg(required = true)]
        repos: Vec<String>,
        #[command(flatten)]
        local: LocalFileArgs,
    },
    /// Show per-repo worktree state for a feature
    Status { feature: String },
    /// Write the feature's .code-workspace file and open it in an editor
    Open {
        feature: String,
        /// Editor command (default: config, else cursor or code if installed)
        #[arg(long)]
        editor: Option<String>,
    },
    /// Run an agent in a feature workspace
    Run(AgentArgs),
    /// Run an agent in planning mode
    Plan(AgentArgs),
    /// Run an agent in implementation mode
    Implement(AgentArgs),
    /// Remove worktrees of a feature (all repos unless --repo is given)
    Rm {
        feature: String,
        /// Repo to remove; repeatable
        #[arg(long = "repo")]
        repos: Vec<String>,
        /// Remove dirty worktrees and non-worktree directories too
        #[arg(long)]
        force: bool,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args, Clone)]
pub struct LocalFileArgs {
    /// Copy local (uncommitted) files into new worktrees
    #[arg(long, overrides_with = "no_copy_local")]
    pub copy_local: bool,
    #[arg(long, overrides_with = "copy_local")]
    pub no_copy_local: bool,
    /// Overwrite files already present in the worktree when copying
    #[arg(long, overrides_with = "no_overwrite_local")]
    pub overwrite_local: bool,
    #[arg(long, overrides_with = "overwrite_local")]
    pub no_overwrite_local: bool,
}

impl LocalFileArgs {
    fn copy_local(&self) -> Option<bool> {
        flag_pair(self.copy_local, self.no_copy_local)
    }

    fn overwrite_local(&self) -> Option<bool> {
        flag_pair(self.overwrite_local, self.no_overwrite_local)
    }
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[derive(clap::Args, Clone)]
pub struct AgentArgs {
    pub feature: String,
    /// Agent CLI: codex or claude
    pub agent: String,
    /// Print the command instead of running it
    #[arg(long)]
    pub print: bool,
    /// Arguments passed through to the agent
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration and the files it came from
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a commented .pal.toml into the root
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root: self.root.clone(),
            worktree_root: self.worktree_root.clone(),
            branch_prefix: self.branch_prefix.clone(),
            ..Default::default()
        }
    }

    fn resolve_config(&self, overrides: CliOverrides) -> Result<ResolvedConfig> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let config = ConfigResolver::new(cwd)
            .resolve(&overrides)
            .context("Failed to resolve configuration")?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pal=debug" } else { "pal=warn" };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Doctor => cmd::cmd_doctor(&cli.resolve_config(cli.overrides())?)?,
        Commands::Repos => cmd::cmd_repos(&cli.resolve_config(cli.overrides())?)?,
        Commands::Ls => cmd::cmd_ls(&cli.resolve_config(cli.overrides())?)?,
        Commands::New {
            feature,
            repos,
            local,
        }
        | Commands::Add {
            feature,
            repos,
            local,
        } => {
            let config = cli.resolve_config(CliOverrides {
                copy_local: local.copy_local(),
                overwrite_local: local.overwrite_local(),
                ..cli.overrides()
            })?;
            let existing_only = matches!(cli.command, Commands::Add { .. });
            cmd::cmd_attach(&config, feature, repos, existing_only)?;
        }
        Commands::Status { feature } => {
            cmd::cmd_status(&cli.resolve_config(cli.overrides())?, feature)?
        }
        Commands::Open { feature, editor } => {
            let config = cli.resolve_config(CliOverrides {
                editor: editor.clone(),
                ..cli.overrides()
            })?;
            cmd::cmd_open(&config, feature)?;
        }
        Commands::Run(args) => {
            cmd::cmd_agent(&cli.resolve_config(cli.overrides())?, args, Intent::Run)?
        }
        Commands::Plan(args) => {
            cmd::cmd_agent(&cli.resolve_config(cli.overrides())?, args, Intent::Plan)?
        }
        Commands::Implement(args) => cmd::cmd_agent(
            &cli.resolve_config(cli.overrides())?,
            args,
            Intent::Implement,
        )?,
        Commands::Rm {
            feature,
            repos,
            force,
            yes,
        } => cmd::cmd_rm(
            &cli.resolve_config(cli.overrides())?,
            feature,
            repos,
            *force,
            *yes,
        )?,
        Commands::Config { command } => {
            cmd::cmd_config(&cli.resolve_config(cli.overrides())?, command.clone())?
        }
    }

    Ok(())
}
