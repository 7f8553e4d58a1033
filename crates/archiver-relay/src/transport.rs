//! Client-side transports to the relay.
//!
//! A [`RelayConnection`] is a pair of channels; connectors decide what sits
//! behind them: the connection manager in the same process, or the relay
//! server over a Unix socket.

use std::future::Future;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use archiver_core::{ClientEnvelope, RelayEnvelope};

use crate::error::TransportError;
use crate::manager::ManagerHandle;

/// One live connection from a client session to the relay.
#[derive(Debug)]
pub struct RelayConnection {
    outbound: mpsc::UnboundedSender<ClientEnvelope>,
    inbound: mpsc::UnboundedReceiver<RelayEnvelope>,
}

/// The relay's end of an in-memory connection.
#[derive(Debug)]
pub struct RelayPeer {
    pub requests: mpsc::UnboundedReceiver<ClientEnvelope>,
    pub replies: mpsc::UnboundedSender<RelayEnvelope>,
}

impl RelayConnection {
    pub fn pair() -> (Self, RelayPeer) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: req_tx,
                inbound: reply_rx,
            },
            RelayPeer {
                requests: req_rx,
                replies: reply_tx,
            },
        )
    }

    pub fn send(&self, envelope: ClientEnvelope) -> Result<(), TransportError> {
        self.outbound
            .send(envelope)
            .map_err(|_| TransportError::Closed)
    }

    /// Next message from the relay, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<RelayEnvelope> {
        self.inbound.recv().await
    }
}

pub trait RelayConnector: Send + Sync {
    fn connect(&self) -> impl Future<Output = Result<RelayConnection, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

impl RelayConnector for ManagerHandle {
    async fn connect(&self) -> Result<RelayConnection, TransportError> {
        let mut attachment = self.attach().await?;
        let (connection, mut peer) = RelayConnection::pair();
        let session = attachment.session();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = peer.requests.recv() => {
                        let Some(request) = request else { break };
                        if attachment.send(request).is_err() {
                            break;
                        }
                    }
                    message = attachment.recv() => {
                        let Some(message) = message else { break };
                        if peer.replies.send(message).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(session, "in-process relay link closed");
        });

        Ok(connection)
    }
}

// ---------------------------------------------------------------------------
// Unix socket
// ---------------------------------------------------------------------------

/// Connects to a relay server listening on a Unix socket.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RelayConnector for UnixConnector {
    async fn connect(&self) -> Result<RelayConnection, TransportError> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|source| TransportError::Connect {
                path: self.path.clone(),
                source,
            })?;
        let (reader, mut writer) = stream.into_split();
        let (connection, mut peer) = RelayConnection::pair();

        tokio::spawn(async move {
            while let Some(request) = peer.requests.recv().await {
                if let Err(e) = write_line(&mut writer, &request).await {
                    tracing::debug!(error = %e, "relay write failed");
                    break;
                }
            }
        });

        let replies = peer.replies;
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match serde_json::from_str::<RelayEnvelope>(&line) {
                        Ok(message) => {
                            if replies.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "unparseable relay message skipped"),
                    },
                    Ok(None) => {
                        tracing::debug!("relay closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "relay read failed");
                        break;
                    }
                }
            }
        });

        tracing::debug!(path = %self.path.display(), "connected to relay");
        Ok(connection)
    }
}

/// Serialize a value as a single JSON line terminated by `\n` and flush.
pub(crate) async fn write_line<W, T>(writer: &mut W, value: &T) -> Result<(), TransportError>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut buf = serde_json::to_vec(value)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
