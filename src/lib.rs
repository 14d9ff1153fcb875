//! pal: feature workspaces spanning several git repositories.
//!
//! A feature is a directory under the worktree root holding one linked git
//! worktree per repo it spans, plus a generated `.code-workspace` file.
//! Coding agents are launched inside that directory with write-scope
//! guardrails derived from the resolved configuration.

pub mod agent;
pub mod config;
pub mod errors;
pub mod git;
pub mod pal_config;
pub mod registry;
pub mod repos;
pub mod util;
pub mod workspace_file;
pub mod worktree;

#[cfg(test)]
mod test_support;
