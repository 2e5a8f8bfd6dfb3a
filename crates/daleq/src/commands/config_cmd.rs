//! Config subcommand handlers.

use std::path::PathBuf;

use daleq_config::{Config, config_path, save_config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

/// Config file this invocation reads and writes.
fn target_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

fn format_config_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = target_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            save_config(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Configuration written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = util::config(global)?;
            let out = output::render_single(&global.output, &cfg, format_config_toml, |c| {
                c.node.id.clone()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&target_path(global).display().to_string(), global.quiet);
            Ok(())
        }
    }
}
