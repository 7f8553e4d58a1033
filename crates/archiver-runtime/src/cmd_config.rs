//! `archiver config`: show or change the configuration.
//!
//! Changes go through the running relay so every attached session hears
//! about them. With no relay running the file is edited directly.

use std::path::Path;

use archiver_core::{ClientRequest, ConfigUpdate, Configuration, RelayBody};
use archiver_relay::ConfigStore;
use archiver_relay::config_store::read_config;

use crate::client::{is_unreachable, rpc_call};

pub async fn cmd_config(
    socket_path: &str,
    config_path: &Path,
    update: Option<ConfigUpdate>,
) -> anyhow::Result<()> {
    let config = match update {
        Some(update) => apply_update(socket_path, config_path, update).await?,
        None => read_config(config_path)?,
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Apply `update` via the relay, or via the file when no relay is listening.
pub(crate) async fn apply_update(
    socket_path: &str,
    config_path: &Path,
    update: ConfigUpdate,
) -> anyhow::Result<Configuration> {
    match rpc_call(socket_path, ClientRequest::Configure(update.clone())).await {
        Ok(RelayBody::Config { msg }) => Ok(msg),
        Ok(RelayBody::Error(failure)) => anyhow::bail!("{failure}"),
        Ok(other) => anyhow::bail!("unexpected relay reply: {other:?}"),
        Err(e) if is_unreachable(&e) => {
            tracing::debug!(error = %e, "relay not running, editing config file");
            let store = ConfigStore::load(config_path)?;
            Ok(store.update(&update)?)
        }
        Err(e) => Err(e.into()),
    }
}
