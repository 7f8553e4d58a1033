//! Unix-socket relay server.
//!
//! Protocol: newline-delimited JSON over Unix stream sockets. Each accepted
//! socket is one client session: it is attached to the connection manager
//! on accept and detached when the socket closes.
//!
//! Client lines are [`ClientEnvelope`]s; relay lines are [`RelayEnvelope`]s.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use archiver_core::{ClientEnvelope, RelayBody, RelayEnvelope, RelayFailure};

use crate::manager::ManagerHandle;
use crate::transport::write_line;

pub struct RelayServer {
    socket_path: PathBuf,
    manager: ManagerHandle,
    cancel: CancellationToken,
}

impl RelayServer {
    pub fn new(socket_path: impl Into<PathBuf>, manager: ManagerHandle) -> Self {
        Self::with_cancel(socket_path, manager, CancellationToken::new())
    }

    /// Create a server with an explicit cancellation token for graceful shutdown.
    pub fn with_cancel(
        socket_path: impl Into<PathBuf>,
        manager: ManagerHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            manager,
            cancel,
        }
    }

    /// Bind the listener and accept connections until cancelled or a fatal
    /// listener error occurs. The socket file is removed on the way out.
    pub async fn run(self) -> std::io::Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await?;
            }
        }

        if UnixStream::connect(&self.socket_path).await.is_ok() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("another relay is already running at {}", self.socket_path.display()),
            ));
        }
        cleanup_socket(&self.socket_path).await;

        let listener = UnixListener::bind(&self.socket_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        tracing::info!(path = %self.socket_path.display(), "relay server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let manager = self.manager.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, manager).await {
                                    tracing::debug!(error = %e, "client handler finished with error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("relay server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        cleanup_socket(&self.socket_path).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-client handler
// ---------------------------------------------------------------------------

async fn handle_client(stream: UnixStream, manager: ManagerHandle) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let Ok(mut attachment) = manager.attach().await else {
        tracing::warn!("connection manager is gone, refusing client");
        return Ok(());
    };
    let session = attachment.session();
    tracing::debug!(session, "client connected");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => {
                        tracing::debug!(session, "client disconnected (EOF)");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(session, error = %e, "read error, dropping client");
                        return Err(e);
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let envelope: ClientEnvelope = match serde_json::from_str(&line) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        let failure = RelayFailure::transport(format!("parse error: {e}"));
                        send(&mut writer, &RelayEnvelope::push(RelayBody::Error(failure))).await?;
                        continue;
                    }
                };
                if attachment.send(envelope).is_err() {
                    tracing::debug!(session, "connection manager stopped, dropping client");
                    return Ok(());
                }
            }

            message = attachment.recv() => {
                let Some(message) = message else {
                    tracing::debug!(session, "attachment closed, dropping client");
                    return Ok(());
                };
                if let Err(e) = send(&mut writer, &message).await {
                    tracing::debug!(session, error = %e, "failed to push message, dropping client");
                    return Err(e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn send(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    message: &RelayEnvelope,
) -> std::io::Result<()> {
    write_line(writer, message)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
}

/// Remove a stale socket file if it exists.
async fn cleanup_socket(path: &Path) {
    if path.exists() {
        tracing::info!(path = %path.display(), "removing stale socket");
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(
                error = %e,
                path = %path.display(),
                "failed to remove stale socket"
            );
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
