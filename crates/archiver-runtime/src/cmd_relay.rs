//! `archiver relay`: the long-running connection manager plus its UDS server.

use std::path::Path;
use std::sync::Arc;

use archiver_agent::NativeAgent;
use archiver_relay::{ConfigStore, ConnectionManager, RelayServer};
use tokio_util::sync::CancellationToken;

pub async fn run_relay(socket_path: &str, config_path: &Path, agent: &str) -> anyhow::Result<()> {
    let store = Arc::new(ConfigStore::load(config_path)?);

    let cancel = CancellationToken::new();
    let (manager, handle) =
        ConnectionManager::with_cancel(NativeAgent::new(agent), store, cancel.clone());
    let mut manager_handle = tokio::spawn(manager.run());

    let server = RelayServer::with_cancel(socket_path, handle, cancel.clone());
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("relay server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await?;
            tracing::info!("received ctrl-c, shutting down");
        }

        Ok::<(), std::io::Error>(())
    };

    let result = tokio::select! {
        r = shutdown => r,
        _ = &mut manager_handle => {
            tracing::warn!("connection manager exited unexpectedly");
            Ok(())
        }
        _ = &mut server_handle => {
            tracing::warn!("relay server exited unexpectedly");
            Ok(())
        }
    };

    cancel.cancel();
    if !manager_handle.is_finished() {
        let _ = manager_handle.await;
    }
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }

    tracing::info!("relay stopped");
    result?;
    Ok(())
}
