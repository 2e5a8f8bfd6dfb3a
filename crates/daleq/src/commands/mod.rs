//! Command handlers, one module per subcommand.

pub mod config_cmd;
pub mod describe;
pub mod dispatch;
pub mod run;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a tree command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(args, global).await,
        Command::Dispatch(args) => dispatch::handle(&args, global),
        Command::Describe => describe::handle(global),
        Command::Config(_) | Command::Completions(_) => {
            unreachable!("config and completions are handled in main")
        }
    }
}
