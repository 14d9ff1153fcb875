//! Prerequisite checks: `pal doctor`.

use anyhow::Result;
use console::style;
use std::process::{Command, Stdio};

use super::workspace::DETECTED_EDITORS;
use pal::config::ResolvedConfig;

/// First line of `<program> --version`, if the program runs at all.
fn probe(program: &str) -> Option<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(stdout.lines().next().unwrap_or_default().trim().to_string())
}

fn check(label: &str, program: &str) -> bool {
    match probe(program) {
        Some(version) => {
            println!(
                "{} {}: {} {}",
                style("✓").green(),
                label,
                program,
                style(version).dim()
            );
            true
        }
        None => {
            println!(
                "{} {}: {} (not found in PATH)",
                style("✗").red(),
                label,
                program
            );
            false
        }
    }
}

pub fn cmd_doctor(config: &ResolvedConfig) -> Result<()> {
    use pal::util::find_on_path;

    println!();
    let mut ok = check("Git", "git");
    let has_codex = check("Codex CLI", &config.codex.command);
    let has_claude = check("Claude Code CLI", &config.claude.command);
    if !has_codex && !has_claude {
        ok = false;
        println!(
            "{}",
            style("At least one agent CLI is required: codex or claude.").red()
        );
    }

    let editor = config
        .editor
        .split_whitespace()
        .next()
        .map(str::to_string)
        .or_else(|| {
            DETECTED_EDITORS
                .into_iter()
                .find(|e| find_on_path(e).is_some())
                .map(str::to_string)
        });
    match editor {
        Some(editor) => {
            check("Editor", &editor);
        }
        None => println!(
            "{} Editor: cursor/code not found (pal open will still write the .code-workspace file)",
            style("•").yellow()
        ),
    }

    println!();
    println!("{}", style("Resolved config").bold());
    println!("  root:          {}", config.root.display());
    println!("  worktree_root: {}", config.worktree_root.display());
    println!("  branch_prefix: {}", config.branch_prefix);
    match &config.global_config_path {
        Some(path) => println!("  global config: {}", path.display()),
        None => println!("  global config: (none)"),
    }
    println!("  local config:  {}", config.local_config_path.display());
    println!();

    if !ok {
        anyhow::bail!("missing prerequisites");
    }
    Ok(())
}
