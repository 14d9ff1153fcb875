//! Claude stages: writable roots become `--add-dir`, bypass-permission
//! requests are vetoed unless allowed, and intents map to `--permission-mode`.

use super::args::{has_flag, split_flag, writable_roots};
use super::{Draft, Intent, Stage, StageContext};
use crate::errors::InvocationError;

pub(crate) const STAGES: &[Stage] = &[add_writable_roots, veto_bypass, apply_intent];

const PERMISSION_MODE: &str = "--permission-mode";
const MODEL: &str = "--model";
const SKIP_PERMISSION_FLAGS: [&str; 2] = [
    "--dangerously-skip-permissions",
    "--allow-dangerously-skip-permissions",
];

fn add_writable_roots(mut draft: Draft, ctx: &StageContext<'_>) -> Result<Draft, InvocationError> {
    let config = ctx.config;
    for dir in writable_roots(&config.agent.add_dirs, &config.claude.add_dirs, ctx.workspace) {
        draft.writable_roots.push("--add-dir".to_string());
        draft.writable_roots.push(dir);
    }
    Ok(draft)
}

pub(crate) fn is_bypass_mode(mode: &str) -> bool {
    matches!(
        mode.trim().to_lowercase().as_str(),
        "bypasspermissions" | "bypass_permissions" | "bypass-permissions"
    )
}

/// First flag in `args` that would bypass permission prompts.
fn find_bypass(args: &[String]) -> Result<Option<String>, InvocationError> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if SKIP_PERMISSION_FLAGS
            .iter()
            .any(|flag| split_flag(arg, flag).is_some())
        {
            return Ok(Some(arg.clone()));
        }
        match split_flag(arg, PERMISSION_MODE) {
            Some(Some(mode)) if is_bypass_mode(mode) => return Ok(Some(arg.clone())),
            Some(None) => {
                let mode = iter.next().ok_or_else(|| InvocationError::MissingFlagValue {
                    flag: arg.clone(),
                })?;
                if is_bypass_mode(mode) {
                    return Ok(Some(format!("{arg} {mode}")));
                }
            }
            Some(Some(_)) => {}
            None if arg.starts_with("--dangerously") => {
                return Err(InvocationError::UnrecognizedSafetyFlag { flag: arg.clone() });
            }
            None => {}
        }
    }
    Ok(None)
}

fn veto_bypass(draft: Draft, ctx: &StageContext<'_>) -> Result<Draft, InvocationError> {
    if ctx.config.claude.allow_bypass_permissions {
        return Ok(draft);
    }
    for args in [&draft.extra_args, &draft.passthrough] {
        if let Some(flag) = find_bypass(args)? {
            return Err(InvocationError::BypassPermissions { flag });
        }
    }
    Ok(draft)
}

fn apply_intent(mut draft: Draft, ctx: &StageContext<'_>) -> Result<Draft, InvocationError> {
    let claude = &ctx.config.claude;
    let supplied = |name: &str| has_flag(draft.extra_args.iter().chain(&draft.passthrough), name);

    let mode = match ctx.intent {
        Intent::Plan => Some("plan"),
        Intent::Implement => Some(claude.permission_mode.trim()).filter(|m| !m.is_empty()),
        Intent::Run => None,
    };
    let mut injected = Vec::new();
    if let Some(mode) = mode
        && !supplied(PERMISSION_MODE)
    {
        if is_bypass_mode(mode) && !claude.allow_bypass_permissions {
            return Err(InvocationError::BypassPermissions {
                flag: format!("[claude].permission_mode = \"{mode}\""),
            });
        }
        injected.push(PERMISSION_MODE.to_string());
        injected.push(mode.to_string());
    }

    let model = claude.model.trim();
    if !model.is_empty() && !supplied(MODEL) {
        injected.push(MODEL.to_string());
        injected.push(model.to_string());
    }

    draft.intent_args.extend(injected);
    Ok(draft)
}
