//! Configuration view and validation commands: `pal config`.

use anyhow::{Context, Result};
use console::style;

use super::super::ConfigCommands;
use pal::config::ResolvedConfig;

pub fn cmd_config(config: &ResolvedConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(config),
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if config.warnings.is_empty() {
                println!("{} Configuration is valid.", style("✓").green());
            } else {
                println!("Configuration warnings:");
                for warning in &config.warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init { force }) => {
            use pal::pal_config::local_config_template;

            let path = &config.local_config_path;
            if path.exists() && !force {
                println!("{} already exists at {}", style(".pal.toml").bold(), path.display());
                println!("Use --force to replace it.");
                return Ok(());
            }
            std::fs::write(path, local_config_template())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} wrote {}", style("✓").green(), path.display());
        }
    }
    Ok(())
}

fn show(config: &ResolvedConfig) {
    println!();
    println!("{}", style("pal configuration").bold());
    println!("=================");
    println!();
    println!("Layers (lowest precedence first):");
    for layer in &config.layers {
        println!("  - {}", layer);
    }
    match &config.global_config_path {
        Some(path) if !path.exists() => {
            println!("  {}", style(format!("(no global config at {})", path.display())).dim())
        }
        _ => {}
    }
    if !config.local_config_path.exists() {
        println!(
            "  {}",
            style(format!(
                "(no local config at {}; run 'pal config init')",
                config.local_config_path.display()
            ))
            .dim()
        );
    }
    println!();

    println!("root = \"{}\"", config.root.display());
    println!("worktree_root = \"{}\"", config.worktree_root.display());
    println!("branch_prefix = \"{}\"", config.branch_prefix);
    println!("repos = {:?}", config.repos);
    println!("editor = \"{}\"", config.editor);
    println!();

    let codex = &config.codex;
    println!("[codex]");
    println!("  command = \"{}\"", codex.command);
    println!("  sandbox = \"{}\"", codex.sandbox);
    println!("  approval = \"{}\"", codex.approval);
    println!("  full_auto = {}", codex.full_auto);
    println!("  add_dirs = {:?}", codex.add_dirs);
    println!("  extra_args = {:?}", codex.extra_args);
    println!();

    let claude = &config.claude;
    println!("[claude]");
    println!("  command = \"{}\"", claude.command);
    println!("  permission_mode = \"{}\"", claude.permission_mode);
    println!("  model = \"{}\"", claude.model);
    println!("  add_dirs = {:?}", claude.add_dirs);
    println!("  extra_args = {:?}", claude.extra_args);
    println!(
        "  allow_bypass_permissions = {}",
        claude.allow_bypass_permissions
    );
    println!();

    println!("[agent]");
    println!("  add_dirs = {:?}", config.agent.add_dirs);
    println!();

    let local = &config.local_files;
    println!("[local_files]");
    println!("  enabled = {}", local.enabled);
    println!("  overwrite = {}", local.overwrite);
    println!("  paths = {:?}", local.paths);
    println!("  patterns = {:?}", local.patterns);
    for (repo, rules) in &local.repos {
        println!("  [local_files.repos.{}]", repo);
        println!("    paths = {:?}", rules.paths);
        println!("    patterns = {:?}", rules.patterns);
    }
    println!();

    if !config.warnings.is_empty() {
        println!("{}", style("Warnings:").yellow());
        for warning in &config.warnings {
            println!("  - {}", warning);
        }
        println!();
    }
}
