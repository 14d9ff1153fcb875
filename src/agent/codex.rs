//! Codex stages: `--cd` and `--sandbox` are locked to the feature workspace;
//! `plan` becomes a `/plan` prompt.

use std::path::Path;

use tracing::debug;

use super::args::{split_flag, writable_roots};
use super::{Draft, Intent, Stage, StageContext};
use crate::config::SandboxMode;
use crate::errors::InvocationError;
use crate::util::paths_equal;

pub(crate) const STAGES: &[Stage] = &[
    add_writable_roots,
    lock_working_directory,
    lock_sandbox,
    apply_intent,
];

/// First words that Codex parses as a subcommand rather than a prompt.
const SUBCOMMANDS: [&str; 16] = [
    "app-server",
    "cloud",
    "completion",
    "debug",
    "exec",
    "features",
    "fork",
    "help",
    "login",
    "logout",
    "mcp",
    "proto",
    "resume",
    "r",
    "e",
    "sandbox",
];

const BYPASS_FLAGS: [&str; 2] = ["--dangerously-bypass-approvals-and-sandbox", "--yolo"];

fn add_writable_roots(mut draft: Draft, ctx: &StageContext<'_>) -> Result<Draft, InvocationError> {
    let config = ctx.config;
    for dir in writable_roots(&config.agent.add_dirs, &config.codex.add_dirs, ctx.workspace) {
        draft.writable_roots.push("--add-dir".to_string());
        draft.writable_roots.push(dir);
    }
    Ok(draft)
}

/// Plan passthrough is vetted as a prompt by [`apply_intent`], so only the
/// other intents have their passthrough scanned for flags.
fn scans_passthrough(ctx: &StageContext<'_>) -> bool {
    ctx.intent != Intent::Plan
}

fn lock_working_directory(
    mut draft: Draft,
    ctx: &StageContext<'_>,
) -> Result<Draft, InvocationError> {
    draft.extra_args = strip_working_directory(draft.extra_args, ctx.workspace)?;
    if scans_passthrough(ctx) {
        draft.passthrough = strip_working_directory(draft.passthrough, ctx.workspace)?;
    }
    draft.guardrails.push("--cd".to_string());
    draft
        .guardrails
        .push(ctx.workspace.to_string_lossy().into_owned());
    Ok(draft)
}

/// Drop `--cd`/`-C` flags naming the workspace; reject any naming elsewhere.
fn strip_working_directory(
    args: Vec<String>,
    workspace: &Path,
) -> Result<Vec<String>, InvocationError> {
    let mut kept = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let value = if arg == "--cd" || arg == "-C" {
            let value = iter
                .next()
                .ok_or_else(|| InvocationError::MissingFlagValue { flag: arg.clone() })?;
            Some((format!("{arg} {value}"), value))
        } else if let Some(value) = arg.strip_prefix("--cd=") {
            Some((arg.clone(), value.to_string()))
        } else if let Some(value) = arg.strip_prefix("-C").filter(|v| !v.is_empty()) {
            Some((arg.clone(), value.to_string()))
        } else {
            None
        };

        match value {
            None => kept.push(arg),
            Some((flag, value)) => {
                if !paths_equal(&workspace.join(&value), workspace) {
                    return Err(InvocationError::WorkingDirectoryOverride {
                        flag,
                        workspace: workspace.to_path_buf(),
                    });
                }
                debug!(%flag, "dropping redundant working-directory flag");
            }
        }
    }
    Ok(kept)
}

fn lock_sandbox(mut draft: Draft, ctx: &StageContext<'_>) -> Result<Draft, InvocationError> {
    let configured = ctx.config.codex.sandbox;
    let locked = match configured {
        SandboxMode::DangerFullAccess => SandboxMode::DangerFullAccess,
        SandboxMode::ReadOnly | SandboxMode::WorkspaceWrite => SandboxMode::WorkspaceWrite,
    };

    let (extra_args, mut requests) = take_sandbox_requests(draft.extra_args)?;
    draft.extra_args = extra_args;
    if scans_passthrough(ctx) {
        let (passthrough, more) = take_sandbox_requests(draft.passthrough)?;
        draft.passthrough = passthrough;
        requests.extend(more);
    }

    let mut effective = locked;
    for (flag, requested) in requests {
        if requested > locked {
            return Err(InvocationError::ScopeEscalation {
                flag,
                requested: requested.to_string(),
                locked: locked.to_string(),
            });
        }
        if requested < locked && configured != SandboxMode::DangerFullAccess {
            return Err(InvocationError::ScopeConflict {
                flag,
                requested: requested.to_string(),
                locked: locked.to_string(),
            });
        }
        debug!(%flag, %requested, "sandbox request folded into locked flag");
        effective = requested;
    }

    draft.guardrails.push("--sandbox".to_string());
    draft.guardrails.push(effective.to_string());

    // Approval is not locked: a flag given by the caller replaces the configured one.
    let caller_approval = sets_approval(&draft.extra_args)
        || (scans_passthrough(ctx) && sets_approval(&draft.passthrough));
    if caller_approval {
        debug!("approval set by caller; skipping configured approval");
    } else if ctx.config.codex.full_auto {
        draft.guardrails.push("--full-auto".to_string());
    } else {
        draft.guardrails.push("--ask-for-approval".to_string());
        draft
            .guardrails
            .push(ctx.config.codex.approval.to_string());
    }
    Ok(draft)
}

/// Whether `args` already choose an approval mode: `-a X`, `-aX`,
/// `--ask-for-approval[=X]` or `--full-auto`.
fn sets_approval(args: &[String]) -> bool {
    args.iter().any(|arg| {
        arg.starts_with("-a")
            || arg == "--full-auto"
            || split_flag(arg, "--ask-for-approval").is_some()
    })
}

fn parse_scope(flag: &str, value: &str) -> Result<SandboxMode, InvocationError> {
    value
        .trim()
        .trim_matches(['"', '\''])
        .parse()
        .map_err(|_| InvocationError::UnrecognizedSafetyFlag {
            flag: flag.to_string(),
        })
}

/// The sandbox scope set by a `-c`/`--config` override, if it sets one.
fn config_override_scope(flag: &str, value: &str) -> Result<Option<SandboxMode>, InvocationError> {
    match value.split_once('=') {
        Some((key, scope)) if key.trim() == "sandbox_mode" => parse_scope(flag, scope).map(Some),
        _ => Ok(None),
    }
}

/// Remove every spelling of a sandbox request from `args`, returning the
/// remaining arguments and the requests in order.
fn take_sandbox_requests(
    args: Vec<String>,
) -> Result<(Vec<String>, Vec<(String, SandboxMode)>), InvocationError> {
    let mut kept = Vec::with_capacity(args.len());
    let mut requests = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if arg == "--sandbox" || arg == "-s" {
            let value = iter
                .next()
                .ok_or_else(|| InvocationError::MissingFlagValue { flag: arg.clone() })?;
            let flag = format!("{arg} {value}");
            let scope = parse_scope(&flag, &value)?;
            requests.push((flag, scope));
        } else if let Some(value) = arg.strip_prefix("--sandbox=") {
            requests.push((arg.clone(), parse_scope(&arg, value)?));
        } else if arg == "-c" || arg == "--config" {
            let value = iter
                .next()
                .ok_or_else(|| InvocationError::MissingFlagValue { flag: arg.clone() })?;
            let flag = format!("{arg} {value}");
            match config_override_scope(&flag, &value)? {
                Some(scope) => requests.push((flag, scope)),
                None => {
                    kept.push(arg);
                    kept.push(value);
                }
            }
        } else if let Some(value) = arg
            .strip_prefix("--config=")
            .or_else(|| arg.strip_prefix("-c").filter(|v| !v.is_empty()))
        {
            match config_override_scope(&arg, value)? {
                Some(scope) => requests.push((arg.clone(), scope)),
                None => kept.push(arg),
            }
        } else if BYPASS_FLAGS.contains(&arg.as_str()) {
            requests.push((arg, SandboxMode::DangerFullAccess));
        } else if arg.starts_with("--sandbox") || arg.starts_with("--dangerously") {
            return Err(InvocationError::UnrecognizedSafetyFlag { flag: arg });
        } else if let Some(value) = arg.strip_prefix("-s").filter(|v| !v.is_empty()) {
            requests.push((arg.clone(), parse_scope(&arg, value)?));
        } else {
            kept.push(arg);
        }
    }
    Ok((kept, requests))
}

fn apply_intent(mut draft: Draft, ctx: &StageContext<'_>) -> Result<Draft, InvocationError> {
    match ctx.intent {
        // Codex has no separate implement mode.
        Intent::Run | Intent::Implement => Ok(draft),
        Intent::Plan => {
            if let Some(flag) = draft.passthrough.iter().find(|arg| arg.starts_with('-')) {
                return Err(InvocationError::PlanPromptOnly { arg: flag.clone() });
            }
            if let Some(first) = draft.passthrough.first()
                && SUBCOMMANDS.contains(&first.to_lowercase().as_str())
            {
                return Err(InvocationError::PlanPromptOnly { arg: first.clone() });
            }
            let prompt = if draft.passthrough.is_empty() {
                "/plan".to_string()
            } else {
                format!("/plan {}", draft.passthrough.join(" "))
            };
            draft.passthrough = vec![prompt];
            Ok(draft)
        }
    }
}
