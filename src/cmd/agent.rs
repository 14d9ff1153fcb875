//! Agent launch commands: `pal run`, `pal plan` and `pal implement`.

use anyhow::{Context, Result};
use console::style;

use super::super::AgentArgs;
use pal::agent::{self, AgentKind, Intent};
use pal::config::ResolvedConfig;

pub fn cmd_agent(config: &ResolvedConfig, args: &AgentArgs, intent: Intent) -> Result<()> {
    use pal::registry::FeatureRegistry;

    let kind: AgentKind = args.agent.parse()?;
    let feature = FeatureRegistry::new(&config.worktree_root).resolve(&args.feature)?;
    let spec = agent::build(kind, intent, &feature.name, &feature.dir, config, &args.args)
        .with_context(|| format!("Refused to launch {} for feature '{}'", kind, feature.name))?;

    if args.print {
        // One token per line keeps the output unambiguous for scripts.
        for token in &spec.argv {
            println!("{}", token);
        }
        return Ok(());
    }

    eprintln!();
    eprintln!("{}", style("Launching agent").bold());
    eprintln!("  workspace: {}", spec.cwd.display());
    eprintln!("  agent:     {}", style(kind).cyan());
    eprintln!("  intent:    {}", intent);
    eprintln!("  command:   {}", style(spec.display_command()).dim());
    eprintln!();

    let status = std::process::Command::new(spec.program())
        .args(spec.args())
        .current_dir(&spec.cwd)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .status()
        .with_context(|| format!("Failed to start '{}'", spec.program()))?;

    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
