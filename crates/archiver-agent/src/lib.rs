//! archiver-agent: IO boundary to the native archiving agent.
//!
//! The agent is an out-of-process black box speaking native-messaging JSON
//! over stdio. This crate frames and transports messages; it holds no
//! routing or naming logic.

pub mod codec;
pub mod error;
pub mod native;

use tokio::sync::mpsc;

use archiver_core::{AgentReply, AgentRequest};

pub use error::AgentError;
pub use native::NativeAgent;

/// Opens connections to the agent. Enables in-memory agents for testing.
pub trait AgentConnector: Send + Sync + 'static {
    fn connect(&self) -> Result<AgentConnection, AgentError>;
}

/// One live agent connection.
///
/// Requests are written in send order and the agent answers them in the
/// same order. Dropping the connection closes the agent's input and, for a
/// spawned process, kills it.
#[derive(Debug)]
pub struct AgentConnection {
    outbound: mpsc::UnboundedSender<AgentRequest>,
    inbound: mpsc::UnboundedReceiver<AgentReply>,
    _child: Option<tokio::process::Child>,
}

/// The agent's end of an in-memory connection.
#[derive(Debug)]
pub struct AgentPeer {
    pub requests: mpsc::UnboundedReceiver<AgentRequest>,
    pub replies: mpsc::UnboundedSender<AgentReply>,
}

impl AgentConnection {
    /// A connection backed by channels instead of a process.
    pub fn in_memory() -> (Self, AgentPeer) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: req_tx,
                inbound: reply_rx,
                _child: None,
            },
            AgentPeer {
                requests: req_rx,
                replies: reply_tx,
            },
        )
    }

    pub(crate) fn from_parts(
        outbound: mpsc::UnboundedSender<AgentRequest>,
        inbound: mpsc::UnboundedReceiver<AgentReply>,
        child: tokio::process::Child,
    ) -> Self {
        Self {
            outbound,
            inbound,
            _child: Some(child),
        }
    }

    /// Queue a request. Fails once the agent side has gone away.
    pub fn send(&self, request: AgentRequest) -> Result<(), AgentError> {
        self.outbound
            .send(request)
            .map_err(|_| AgentError::Disconnected)
    }

    /// Next reply, or `None` once the agent has closed its output.
    pub async fn recv(&mut self) -> Option<AgentReply> {
        self.inbound.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Send a single request on a fresh connection and wait for its reply.
pub async fn one_shot<C>(connector: &C, request: AgentRequest) -> Result<AgentReply, AgentError>
where
    C: AgentConnector + ?Sized,
{
    let mut connection = connector.connect()?;
    let kind = request.kind();
    connection.send(request)?;
    let reply = connection.recv().await.ok_or(AgentError::Disconnected)?;
    tracing::debug!(kind, "one-shot agent request answered");
    Ok(reply)
}
