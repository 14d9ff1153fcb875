//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `workspace`     | `Repos`, `Ls`, `New`, `Add`, `Status`, `Open`, `Rm` |
//! | `agent`         | `Run`, `Plan`, `Implement`                         |
//! | `config`        | `Config`                                           |
//! | `doctor`        | `Doctor`                                           |

pub mod agent;
pub mod config;
pub mod doctor;
pub mod workspace;

pub use agent::cmd_agent;
pub use config::cmd_config;
pub use doctor::cmd_doctor;
pub use workspace::{cmd_attach, cmd_ls, cmd_open, cmd_repos, cmd_rm, cmd_status};
