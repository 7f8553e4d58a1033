//! Connection manager: multiplexes every attached client session onto a
//! single agent connection.
//!
//! The manager is an actor. Attach, request, detach and agent replies are
//! handled one message at a time, so the reference count and the agent
//! handle never change across a suspension point.
//!
//! Invariants:
//! - the agent connection is open while at least one session is attached,
//!   and closed when the last one detaches;
//! - replies are routed back to the session whose request they answer (the
//!   agent answers in request order);
//! - a `get`/`set` without a configured directory is refused locally.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use archiver_agent::{AgentConnection, AgentConnector};
use archiver_core::{
    AgentReply, AgentRequest, ClientEnvelope, ClientRequest, ConfigUpdate, Configuration, NameMap,
    RelayBody, RelayEnvelope, RelayFailure, SuggestionSet,
};

use crate::config_store::ConfigStore;
use crate::error::TransportError;

pub type SessionId = u64;

// ---------------------------------------------------------------------------
// Handle side
// ---------------------------------------------------------------------------

enum Command {
    Attach {
        reply: oneshot::Sender<Attached>,
    },
    Request {
        session: SessionId,
        envelope: ClientEnvelope,
    },
    Detach {
        session: SessionId,
    },
    Status {
        reply: oneshot::Sender<ManagerStatus>,
    },
}

struct Attached {
    session: SessionId,
    inbound: mpsc::UnboundedReceiver<RelayEnvelope>,
}

/// Point-in-time view of the manager, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStatus {
    pub sessions: usize,
    pub agent_open: bool,
    pub in_flight: usize,
}

/// Cloneable entry point to a running [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attach { .. } => f.write_str("Attach"),
            Self::Request { session, envelope } => f
                .debug_struct("Request")
                .field("session", session)
                .field("id", &envelope.id)
                .finish(),
            Self::Detach { session } => f.debug_struct("Detach").field("session", session).finish(),
            Self::Status { .. } => f.write_str("Status"),
        }
    }
}

impl ManagerHandle {
    /// Register a new session. The first messages on the returned attachment
    /// are the current configuration and the known suggestions.
    pub async fn attach(&self) -> Result<Attachment, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Attach { reply: tx })
            .map_err(|_| TransportError::Closed)?;
        let attached = rx.await.map_err(|_| TransportError::Closed)?;
        Ok(Attachment {
            session: attached.session,
            inbound: attached.inbound,
            commands: self.commands.clone(),
        })
    }

    pub async fn status(&self) -> Result<ManagerStatus, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Status { reply: tx })
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)
    }
}

/// A session's registration with the manager. Dropping it detaches.
#[derive(Debug)]
pub struct Attachment {
    session: SessionId,
    inbound: mpsc::UnboundedReceiver<RelayEnvelope>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Attachment {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn send(&self, envelope: ClientEnvelope) -> Result<(), TransportError> {
        self.commands
            .send(Command::Request {
                session: self.session,
                envelope,
            })
            .map_err(|_| TransportError::Closed)
    }

    pub async fn recv(&mut self) -> Option<RelayEnvelope> {
        self.inbound.recv().await
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Detach {
            session: self.session,
        });
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    /// `requested` holds the hashes of a session `get`, whose answer is
    /// completed and trimmed against them.
    Session {
        session: SessionId,
        id: u64,
        requested: Option<Vec<String>>,
    },
    /// Requests the relay issues itself; replies go to every session.
    Relay,
}

pub struct ConnectionManager<C> {
    connector: C,
    store: Arc<ConfigStore>,
    config: watch::Receiver<Configuration>,
    commands: mpsc::UnboundedReceiver<Command>,
    sessions: HashMap<SessionId, mpsc::UnboundedSender<RelayEnvelope>>,
    next_session: SessionId,
    agent: Option<AgentConnection>,
    in_flight: VecDeque<Origin>,
    suggestions: SuggestionSet,
    directory: Option<String>,
    cancel: CancellationToken,
}

impl<C: AgentConnector> ConnectionManager<C> {
    pub fn new(connector: C, store: Arc<ConfigStore>) -> (Self, ManagerHandle) {
        Self::with_cancel(connector, store, CancellationToken::new())
    }

    /// Create a manager with an explicit cancellation token for graceful shutdown.
    pub fn with_cancel(
        connector: C,
        store: Arc<ConfigStore>,
        cancel: CancellationToken,
    ) -> (Self, ManagerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = store.subscribe();
        let directory = config.borrow().directory().map(str::to_string);
        let manager = Self {
            connector,
            store,
            config,
            commands: rx,
            sessions: HashMap::new(),
            next_session: 1,
            agent: None,
            in_flight: VecDeque::new(),
            suggestions: SuggestionSet::new(),
            directory,
            cancel,
        };
        (manager, ManagerHandle { commands: tx })
    }

    /// Process commands, agent replies and configuration changes until
    /// cancelled or every handle is gone.
    pub async fn run(mut self) {
        let mut config_open = true;
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            tracing::debug!("connection manager: all handles dropped");
                            break;
                        }
                    }
                }
                reply = next_reply(&mut self.agent) => {
                    match reply {
                        Some(reply) => self.handle_agent_reply(reply),
                        None => {
                            tracing::warn!("agent closed the connection");
                            self.drop_agent();
                        }
                    }
                }
                changed = self.config.changed(), if config_open => {
                    match changed {
                        Ok(()) => self.handle_config_change(),
                        Err(_) => config_open = false,
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("connection manager: cancellation requested, shutting down");
                    break;
                }
            }
        }
        self.close_agent("shutdown");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Attach { reply } => self.attach(reply),
            Command::Request { session, envelope } => self.forward(session, envelope),
            Command::Detach { session } => self.detach(session),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn status(&self) -> ManagerStatus {
        ManagerStatus {
            sessions: self.sessions.len(),
            agent_open: self.agent.is_some(),
            in_flight: self.in_flight.len(),
        }
    }

    fn attach(&mut self, reply: oneshot::Sender<Attached>) {
        let session = self.next_session;
        self.next_session += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.borrow().clone();
        let _ = tx.send(RelayEnvelope::push(RelayBody::Config { msg: config }));
        if !self.suggestions.is_empty() {
            let _ = tx.send(RelayEnvelope::push(RelayBody::Suggestions {
                msg: self.suggestions.names().to_vec(),
            }));
        }

        if reply.send(Attached { session, inbound: rx }).is_err() {
            tracing::debug!(session, "attach abandoned by caller");
            return;
        }
        self.sessions.insert(session, tx);
        tracing::info!(session, sessions = self.sessions.len(), "session attached");
        self.ensure_agent();
    }

    fn detach(&mut self, session: SessionId) {
        if self.sessions.remove(&session).is_none() {
            return;
        }
        tracing::info!(session, sessions = self.sessions.len(), "session detached");
        if self.sessions.is_empty() {
            self.close_agent("last session detached");
        }
    }

    fn forward(&mut self, session: SessionId, envelope: ClientEnvelope) {
        let ClientEnvelope { id, request } = envelope;
        tracing::debug!(session, id, kind = request.kind(), "request received");

        if let ClientRequest::Configure(update) = request {
            self.configure(session, id, update);
            return;
        }

        let config = self.config.borrow().clone();
        let Some(directory) = config.directory() else {
            self.reply(session, id, RelayBody::Error(RelayFailure::no_directory()));
            return;
        };
        let Some(agent_request) = AgentRequest::from_client(&request, directory) else {
            return;
        };
        let requested = match &request {
            ClientRequest::Get { hashes } if !hashes.is_empty() => Some(hashes.clone()),
            _ => None,
        };
        let origin = Origin::Session {
            session,
            id,
            requested,
        };
        if !self.send_to_agent(agent_request, origin) {
            self.reply(session, id, RelayBody::Error(RelayFailure::agent_unavailable()));
        }
    }

    /// Persist a configuration change off the actor turn. Subscribers hear
    /// about it through the store's watch channel; the caller also gets the
    /// result as its reply.
    fn configure(&mut self, session: SessionId, id: u64, update: ConfigUpdate) {
        let Some(tx) = self.sessions.get(&session).cloned() else {
            return;
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let body = match tokio::task::spawn_blocking(move || store.update(&update)).await {
                Ok(Ok(config)) => RelayBody::Config { msg: config },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "configuration update failed");
                    RelayBody::Error(RelayFailure::transport(e.to_string()))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "configuration writer panicked");
                    RelayBody::Error(RelayFailure::transport("configuration update aborted"))
                }
            };
            let _ = tx.send(RelayEnvelope::reply(id, body));
        });
    }

    fn handle_agent_reply(&mut self, reply: AgentReply) {
        let Some(origin) = self.in_flight.pop_front() else {
            tracing::warn!("agent reply with nothing in flight, ignored");
            return;
        };

        let mut added = Vec::new();
        let body = match reply.into_names() {
            Ok(names) => {
                added = self.suggestions.record(names.values().flatten());
                let msg = match &origin {
                    Origin::Session {
                        requested: Some(hashes),
                        ..
                    } => answer_for(hashes, &names),
                    _ => names,
                };
                RelayBody::Get { msg }
            }
            Err(error) => {
                tracing::warn!(%error, "agent reported an error");
                RelayBody::Error(RelayFailure::transport(error))
            }
        };

        match origin {
            Origin::Session { session, id, .. } => self.reply(session, id, body),
            Origin::Relay => self.broadcast(&body),
        }
        if !added.is_empty() {
            tracing::debug!(count = added.len(), "new suggestions");
            self.broadcast(&RelayBody::Suggestions { msg: added });
        }

        if self.sessions.is_empty() && self.in_flight.is_empty() {
            self.close_agent("transient request answered");
        }
    }

    fn handle_config_change(&mut self) {
        let config = self.config.borrow_and_update().clone();
        self.broadcast(&RelayBody::Config {
            msg: config.clone(),
        });

        let directory = config.directory().map(str::to_string);
        if directory == self.directory {
            return;
        }
        self.directory.clone_from(&directory);

        let Some(directory) = directory else {
            tracing::info!("archive directory unset");
            return;
        };
        tracing::info!(%directory, "archive directory changed, refreshing agent cache");
        let request = AgentRequest::Get {
            directory,
            hashes: Vec::new(),
        };
        if !self.send_to_agent(request, Origin::Relay) {
            tracing::warn!("agent not reachable for directory change");
        }
    }

    // -----------------------------------------------------------------------
    // Agent connection
    // -----------------------------------------------------------------------

    fn ensure_agent(&mut self) -> bool {
        if self.agent.is_some() {
            return true;
        }
        match self.connector.connect() {
            Ok(connection) => {
                tracing::info!("agent connection opened");
                self.agent = Some(connection);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "agent unavailable");
                false
            }
        }
    }

    fn send_to_agent(&mut self, request: AgentRequest, origin: Origin) -> bool {
        if !self.ensure_agent() {
            return false;
        }
        let Some(agent) = &self.agent else {
            return false;
        };
        let kind = request.kind();
        match agent.send(request) {
            Ok(()) => {
                tracing::debug!(kind, ?origin, "forwarded to agent");
                self.in_flight.push_back(origin);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, kind, "agent send failed, discarding connection");
                self.drop_agent();
                false
            }
        }
    }

    /// Forget a failed agent connection. Every request still waiting on it
    /// is answered with "Extension not configured".
    fn drop_agent(&mut self) {
        self.agent = None;
        let stranded: Vec<Origin> = self.in_flight.drain(..).collect();
        for origin in stranded {
            if let Origin::Session { session, id, .. } = origin {
                self.reply(session, id, RelayBody::Error(RelayFailure::agent_unavailable()));
            }
        }
    }

    fn close_agent(&mut self, reason: &'static str) {
        if self.agent.take().is_some() {
            tracing::info!(reason, "agent connection closed");
        }
        self.in_flight.clear();
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    fn reply(&self, session: SessionId, id: u64, body: RelayBody) {
        match self.sessions.get(&session) {
            Some(tx) => {
                let _ = tx.send(RelayEnvelope::reply(id, body));
            }
            None => tracing::debug!(session, id, "reply for detached session dropped"),
        }
    }

    fn broadcast(&self, body: &RelayBody) {
        for tx in self.sessions.values() {
            let _ = tx.send(RelayEnvelope::push(body.clone()));
        }
    }
}

/// The agent answers a `get` with its whole archive map. A session only
/// gets the hashes it asked for; those the archive does not hold are `null`.
fn answer_for(requested: &[String], archive: &NameMap) -> NameMap {
    requested
        .iter()
        .map(|hash| (hash.clone(), archive.get(hash).cloned().flatten()))
        .collect()
}

async fn next_reply(agent: &mut Option<AgentConnection>) -> Option<AgentReply> {
    match agent {
        Some(agent) => agent.recv().await,
        None => std::future::pending().await,
    }
}

// ─── Tests ────────────────────────────────────────────────────────
