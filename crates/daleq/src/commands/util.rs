//! Shared helpers for command handlers.

use daleq_api::{MemoryBroker, MemoryTransport};
use daleq_config::{Config, load_config};
use daleq_core::Node;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the resolved configuration for this invocation.
pub fn config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config(global.config.as_deref())?)
}

/// Build the configured tree on a private in-memory broker.
///
/// Local commands never talk to the network; the broker only exists so the
/// node has a transport.
pub fn local_node(config: &Config) -> Result<Node<MemoryTransport>, CliError> {
    let broker = MemoryBroker::new();
    Ok(config.build_node(broker.transport(&config.node.id))?)
}

/// Split a slash-separated device path into target segments.
///
/// Empty segments are dropped, so "", "/" and "fractal//d1/" are accepted.
pub fn parse_target(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets() {
        assert!(parse_target("").is_empty());
        assert!(parse_target("/").is_empty());
        assert_eq!(parse_target("fractal/bus1"), vec!["fractal", "bus1"]);
        assert_eq!(parse_target("/fractal//d1/"), vec!["fractal", "d1"]);
    }
}
