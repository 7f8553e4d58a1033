//! Process-backed agent: spawns the native host and speaks framed JSON
//! over its stdin/stdout.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::BufReader;
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use archiver_core::{AgentReply, AgentRequest};

use crate::codec::{MAX_INBOUND_FRAME, read_message, write_message};
use crate::error::AgentError;
use crate::{AgentConnection, AgentConnector};

/// Native host launched as a child process per connection.
#[derive(Debug, Clone)]
pub struct NativeAgent {
    program: PathBuf,
    args: Vec<String>,
}

impl NativeAgent {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl AgentConnector for NativeAgent {
    fn connect(&self) -> Result<AgentConnection, AgentError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(AgentError::Disconnected)?;
        let stdout = child.stdout.take().ok_or(AgentError::Disconnected)?;

        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_requests(stdin, req_rx));
        tokio::spawn(read_replies(stdout, reply_tx));

        tracing::info!(program = %self.program.display(), pid = ?child.id(), "agent started");
        Ok(AgentConnection::from_parts(req_tx, reply_rx, child))
    }
}

async fn write_requests(mut stdin: ChildStdin, mut requests: mpsc::UnboundedReceiver<AgentRequest>) {
    while let Some(request) = requests.recv().await {
        if let Err(e) = write_message(&mut stdin, &request).await {
            tracing::warn!(error = %e, kind = request.kind(), "failed to write to agent");
            break;
        }
    }
    // Dropping stdin signals EOF to the host.
}

async fn read_replies(stdout: ChildStdout, replies: mpsc::UnboundedSender<AgentReply>) {
    let mut reader = BufReader::new(stdout);
    loop {
        match read_message::<_, AgentReply>(&mut reader, MAX_INBOUND_FRAME).await {
            Ok(Some(reply)) => {
                if replies.send(reply).is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("agent closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "unreadable agent output, dropping connection");
                break;
            }
        }
    }
}
