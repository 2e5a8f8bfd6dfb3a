//! `daleq dispatch`: run one message through the configured tree.

use serde_json::Value;

use crate::cli::{DispatchArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

pub fn handle(args: &DispatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let message: Value = serde_json::from_str(&args.message)?;
    if !message.is_object() {
        return Err(CliError::Validation {
            field: "message".into(),
            reason: "must be a JSON object".into(),
        });
    }
    let target = util::parse_target(&args.target);

    let config = util::config(global)?;
    let mut node = util::local_node(&config)?;

    tracing::debug!(path = ?target, "dispatching message");
    let answer = node.handle(&target, &message).unwrap_or(Value::Null);

    let out = output::render_value(&global.output, &answer);
    output::print_output(&out, global.quiet);
    Ok(())
}
