//! One-shot relay requests for CLI subcommands.

use archiver_core::{ClientEnvelope, ClientRequest, RelayBody};
use archiver_relay::{RelayConnector, TransportError, UnixConnector};

/// Send one request to the relay and wait for its answer, skipping pushes.
pub(crate) async fn rpc_call(
    socket_path: &str,
    request: ClientRequest,
) -> Result<RelayBody, TransportError> {
    let mut connection = UnixConnector::new(socket_path).connect().await?;
    let id = 1;
    connection.send(ClientEnvelope { id, request })?;

    while let Some(message) = connection.recv().await {
        if message.id == Some(id) {
            return Ok(message.body);
        }
        tracing::debug!(body = ?message.body, "skipping pushed message");
    }
    Err(TransportError::Closed)
}

/// Whether the relay could not be reached at all, as opposed to failing
/// after a connection was made.
pub(crate) fn is_unreachable(error: &TransportError) -> bool {
    matches!(error, TransportError::Connect { .. })
}
