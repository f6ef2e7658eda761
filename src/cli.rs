//! CLI domain: parse, route and output only.
//! No domain orchestration; a single route table dispatches to the library.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands};
pub use route::{resolve_commit, RunContext};
