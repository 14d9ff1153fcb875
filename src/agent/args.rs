//! Flag scanning helpers shared by the agent stages.

use std::path::Path;

use crate::config::{expand_home, normalize_lexically};

/// How `token` spells flag `name`: `Some(None)` for `--name` (value in the
/// next token), `Some(Some(v))` for `--name=v`, `None` if it is another token.
pub fn split_flag<'a>(token: &'a str, name: &str) -> Option<Option<&'a str>> {
    if token == name {
        return Some(None);
    }
    token
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('='))
        .map(Some)
}

/// Whether `name` appears in `args`, in either spelling.
pub fn has_flag<'a>(args: impl IntoIterator<Item = &'a String>, name: &str) -> bool {
    args.into_iter()
        .any(|arg| split_flag(arg, name).is_some())
}

/// Union of the shared and agent-specific writable roots, in that order.
///
/// Blank entries are skipped, `~` is expanded and relative entries are
/// anchored at the workspace. Duplicates keep their first position.
pub fn writable_roots(shared: &[String], specific: &[String], workspace: &Path) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in shared.iter().chain(specific) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let path = expand_home(raw);
        let path = if path.is_absolute() {
            normalize_lexically(&path)
        } else {
            normalize_lexically(&workspace.join(path))
        };
        let dir = path.to_string_lossy().into_owned();
        if !out.contains(&dir) {
            out.push(dir);
        }
    }
    out
}
