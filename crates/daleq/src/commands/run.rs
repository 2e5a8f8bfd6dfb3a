//! `daleq run`: serve the configured tree over a broker connection.

use daleq_api::{MqttTransport, Transport, WebSocketTransport};
use daleq_config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, RunArgs, TransportKind};
use crate::error::CliError;

use super::util;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = util::config(global)?;
    if let Some(host) = args.host {
        config.node.host = host;
    }
    if let Some(port) = args.port {
        config.node.port = port;
    }

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                watcher.cancel();
            }
            Err(e) => warn!(error = %e, "could not listen for interrupt"),
        }
    });

    let reconnect = config.reconnect.to_reconnect_config();
    info!(transport = ?args.transport, host = %config.node.host, port = config.node.port, "starting node");
    let served = match args.transport {
        TransportKind::Mqtt => {
            let transport = MqttTransport::new(&config.node.id, reconnect, cancel.clone());
            serve(&config, transport, &cancel).await
        }
        TransportKind::Websocket => {
            let transport = WebSocketTransport::new(&config.node.id, reconnect, cancel.clone());
            serve(&config, transport, &cancel).await
        }
    };

    cancel.cancel();
    served
}

async fn serve<T: Transport>(
    config: &Config,
    transport: T,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    let mut node = config.build_node(transport)?;
    node.run(cancel.clone()).await?;
    Ok(())
}
