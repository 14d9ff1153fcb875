//! Feature workspace commands: `pal repos`, `ls`, `new`, `add`, `status`,
//! `open` and `rm`.

use anyhow::{Context, Result};
use console::style;

use pal::config::ResolvedConfig;
use pal::worktree::{CopyReport, OperationReport, RepoAction, WorktreeManager, WorktreeState};

/// Editors tried, in order, when none is configured.
pub(crate) const DETECTED_EDITORS: [&str; 2] = ["cursor", "code"];

pub fn cmd_repos(config: &ResolvedConfig) -> Result<()> {
    use pal::repos;

    let found = repos::discover(&config.root, &config.worktree_root, &config.repos)
        .context("Failed to discover repositories")?;
    if found.is_empty() {
        println!(
            "{} No repos found. Put repos under {} or set repos = [...] in .pal.toml.",
            style("!").yellow(),
            config.root.display()
        );
        anyhow::bail!("no repositories found under {}", config.root.display());
    }

    println!();
    println!("{}", style("Repos").bold());
    let width = found.iter().map(|r| r.name.len()).max().unwrap_or(0);
    for repo in &found {
        println!(
            "  {:<width$}  {}",
            style(&repo.name).cyan(),
            style(repo.path.display()).dim(),
        );
    }
    println!();
    Ok(())
}

pub fn cmd_ls(config: &ResolvedConfig) -> Result<()> {
    use pal::registry::FeatureRegistry;

    let features = FeatureRegistry::new(&config.worktree_root)
        .list()
        .context("Failed to list feature workspaces")?;
    if features.is_empty() {
        println!(
            "{} No feature workspaces yet. Try: pal new <feature> <repo...>",
            style("!").yellow()
        );
        return Ok(());
    }

    println!();
    println!("{}", style("Feature workspaces").bold());
    let width = features.iter().map(String::len).max().unwrap_or(0);
    for feature in &features {
        println!(
            "  {:<width$}  {}",
            style(feature).cyan(),
            style(config.feature_dir(feature).display()).dim(),
        );
    }
    println!();
    Ok(())
}

/// `pal new` (any feature) and `pal add` (`existing_only`).
pub fn cmd_attach(
    config: &ResolvedConfig,
    feature: &str,
    repos: &[String],
    existing_only: bool,
) -> Result<()> {
    let manager = WorktreeManager::new(config);
    let report = if existing_only {
        manager.add(feature, repos)
    } else {
        manager.create(feature, repos)
    }
    .with_context(|| format!("Failed to set up feature '{}'", feature))?;

    print_report(config, &report);
    if existing_only && !report.has_failures() {
        println!(
            "{} Restart any agent session already running in this workspace.",
            style("Tip:").yellow()
        );
    }
    finish(&report)
}

pub fn cmd_status(config: &ResolvedConfig, feature: &str) -> Result<()> {
    let status = WorktreeManager::new(config)
        .status(feature)
        .with_context(|| format!("Failed to read status of feature '{}'", feature))?;

    println!();
    println!(
        "{} {}",
        style("Status:").bold(),
        style(&status.feature).bold().cyan()
    );
    if status.entries.is_empty() {
        println!("  {}", style("(no worktrees)").dim());
        println!();
        return Ok(());
    }

    let width = status.entries.iter().map(|e| e.repo.len()).max().unwrap_or(0);
    for entry in &status.entries {
        let state = match entry.state {
            WorktreeState::Active => style(entry.state.to_string()).green(),
            WorktreeState::Missing => style(entry.state.to_string()).red(),
            WorktreeState::Orphaned => style(entry.state.to_string()).yellow(),
        };
        let dirty = match entry.dirty {
            Some(true) => style("dirty").yellow().to_string(),
            Some(false) => "clean".to_string(),
            None => "-".to_string(),
        };
        println!(
            "  {:<width$}  {:<8}  {:<5}  {}  {}",
            entry.repo,
            state,
            dirty,
            entry.branch,
            style(entry.path.display()).dim(),
        );
    }
    println!();
    Ok(())
}

pub fn cmd_open(config: &ResolvedConfig, feature: &str) -> Result<()> {
    use pal::registry::FeatureRegistry;
    use pal::util::find_on_path;
    use pal::workspace_file;

    let resolved = FeatureRegistry::new(&config.worktree_root).resolve(feature)?;
    let status = WorktreeManager::new(config).status(&resolved.name)?;
    let path = workspace_file::generate(&resolved.dir, &resolved.name, &status.active_repos())?;

    let mut words = config.editor.split_whitespace();
    let (program, extra): (Option<String>, Vec<&str>) = match words.next() {
        Some(program) => (Some(program.to_string()), words.collect()),
        None => (
            DETECTED_EDITORS
                .iter()
                .find(|editor| find_on_path(editor).is_some())
                .map(|editor| editor.to_string()),
            Vec::new(),
        ),
    };

    let Some(program) = program else {
        println!("{} wrote workspace: {}", style("✓").green(), path.display());
        println!(
            "{} No editor found. Install the 'cursor' or 'code' CLI, or set editor in .pal.toml.",
            style("!").yellow()
        );
        return Ok(());
    };

    println!(
        "{} opening in {}: {}",
        style("→").cyan(),
        program,
        path.display()
    );
    // The editor CLI returns once the window is handed off; don't wait on it.
    std::process::Command::new(&program)
        .args(&extra)
        .arg(&path)
        .spawn()
        .with_context(|| format!("Failed to launch editor '{}'", program))?;
    Ok(())
}

pub fn cmd_rm(
    config: &ResolvedConfig,
    feature: &str,
    repos: &[String],
    force: bool,
    yes: bool,
) -> Result<()> {
    use dialoguer::Confirm;
    use pal::worktree::RemoveOptions;

    let manager = WorktreeManager::new(config);

    if !yes {
        // A feature dir that is already gone may still have orphaned git
        // metadata; remove() sorts that out, so only preview what exists.
        if let Ok(status) = manager.status(feature) {
            println!();
            println!(
                "{} {}",
                style("Remove worktrees:").bold(),
                style(feature).bold().cyan()
            );
            let targets: Vec<_> = status
                .entries
                .iter()
                .filter(|e| repos.is_empty() || repos.contains(&e.repo))
                .collect();
            if targets.is_empty() && repos.is_empty() {
                println!(
                    "  {}",
                    style("(no worktrees; the feature folder will be removed if empty)").dim()
                );
            }
            for entry in targets {
                println!(
                    "  {}  {}  {}",
                    entry.repo,
                    entry.state,
                    style(entry.path.display()).dim()
                );
            }
            println!();
        }

        let confirm = Confirm::new()
            .with_prompt("Proceed?")
            .default(false)
            .interact()
            .context("Failed to read confirmation; pass --yes to skip the prompt")?;
        if !confirm {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let opts = RemoveOptions {
        repos: repos.to_vec(),
        force,
    };
    let report = manager
        .remove(feature, &opts)
        .with_context(|| format!("Failed to remove feature '{}'", feature))?;
    print_report(config, &report);
    finish(&report)
}

fn print_report(config: &ResolvedConfig, report: &OperationReport) {
    let feature = &report.feature;
    for outcome in &report.outcomes {
        let repo = &outcome.repo;
        match &outcome.result {
            Ok(RepoAction::Created {
                branch_created,
                local_files,
            }) => {
                println!(
                    "{} worktree {}/{} → {} (branch {}{})",
                    style("+").cyan(),
                    feature,
                    repo,
                    config.worktree_path(feature, repo).display(),
                    config.branch_name(feature),
                    if *branch_created { " [new]" } else { "" },
                );
                if let Some(copy) = local_files {
                    print_copy_report(repo, copy);
                }
            }
            Ok(RepoAction::AlreadyPresent) => {
                println!("{} exists: {}/{}", style("✓").green(), feature, repo);
            }
            Ok(RepoAction::Removed) => {
                println!("{} removed {}/{}", style("-").red(), feature, repo);
            }
            Ok(RepoAction::Pruned) => {
                println!(
                    "{} pruned stale worktree metadata for {}/{}",
                    style("-").red(),
                    feature,
                    repo
                );
            }
            Err(err) => {
                println!("{} {}: {}", style("✗").red(), repo, err);
            }
        }
    }

    if let Some(path) = &report.workspace_file {
        println!("{} workspace: {}", style("✓").green(), path.display());
    }
    if report.feature_removed {
        println!(
            "{} removed feature folder {}",
            style("✓").green(),
            config.feature_dir(feature).display()
        );
    }
}

fn print_copy_report(repo: &str, copy: &CopyReport) {
    if copy.is_empty() {
        println!("  {} no local files matched for {}", style("•").dim(), repo);
        return;
    }
    if !copy.copied.is_empty() {
        println!(
            "  {} copied local files for {}: {}",
            style("✓").green(),
            repo,
            copy.copied.len()
        );
    }
    if !copy.skipped_existing.is_empty() {
        println!(
            "  {} skipped existing in worktree for {}: {}",
            style("•").yellow(),
            repo,
            copy.skipped_existing.len()
        );
    }
    if !copy.skipped_missing.is_empty() {
        println!(
            "  {} skipped missing in {}: {}",
            style("•").yellow(),
            repo,
            copy.skipped_missing.len()
        );
    }
    if !copy.skipped_invalid.is_empty() {
        println!(
            "  {} skipped invalid specs for {}: {}",
            style("•").yellow(),
            repo,
            copy.skipped_invalid.join(", ")
        );
    }
    for (path, reason) in &copy.failed {
        println!(
            "  {} failed to copy {}: {}",
            style("✗").red(),
            path.display(),
            reason
        );
    }
}

fn finish(report: &OperationReport) -> Result<()> {
    let failed = report.failures().count();
    if failed > 0 {
        anyhow::bail!(
            "{} of {} repo(s) failed for feature '{}'",
            failed,
            report.outcomes.len(),
            report.feature
        );
    }
    Ok(())
}
