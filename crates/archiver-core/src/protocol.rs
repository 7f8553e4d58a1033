//! Wire protocol.
//!
//! Two hops:
//!
//! - client ↔ relay: newline-delimited JSON envelopes. Requests carry a
//!   correlation `id`; relay messages echo it when they answer a request and
//!   omit it when pushed.
//! - relay ↔ agent: native-messaging JSON (`{"Get": {...}}`, `{"Set": {...}}`,
//!   `{"Pick": null}`) answered by `{"msg": ...}` or `{"error": "..."}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigUpdate, Configuration};

/// Hash → archived name, `None` when the agent does not know the file.
pub type NameMap = BTreeMap<String, Option<String>>;

// ---------------------------------------------------------------------------
// Client → relay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub id: u64,
    #[serde(flatten)]
    pub request: ClientRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientRequest {
    /// Look up names for a batch of hashes.
    Get { hashes: Vec<String> },
    /// Archive `url` under `name`.
    Set {
        hash: String,
        name: String,
        filename: String,
        url: String,
    },
    /// Options surface: change the stored configuration.
    Configure(ConfigUpdate),
}

impl ClientRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Configure(_) => "configure",
        }
    }
}

// ---------------------------------------------------------------------------
// Relay → client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub body: RelayBody,
}

impl RelayEnvelope {
    pub fn reply(id: u64, body: RelayBody) -> Self {
        Self { id: Some(id), body }
    }

    pub fn push(body: RelayBody) -> Self {
        Self { id: None, body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayBody {
    /// Names for hashes. Also the acknowledgement of a `set`.
    Get { msg: NameMap },
    /// Names newly known to the archive.
    Suggestions { msg: Vec<String> },
    /// Current configuration, pushed on attach and on every change.
    Config { msg: Configuration },
    Error(RelayFailure),
}

/// Error surfaced to a client as a typed `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RelayFailure {
    pub const NO_DIRECTORY: &'static str = "No directory set";
    pub const AGENT_UNAVAILABLE: &'static str = "Extension not configured";

    pub fn no_directory() -> Self {
        Self {
            error: Self::NO_DIRECTORY.to_string(),
            detail: Some("Set an archive directory with `archiver pick` or `archiver config`".into()),
        }
    }

    pub fn agent_unavailable() -> Self {
        Self {
            error: Self::AGENT_UNAVAILABLE.to_string(),
            detail: Some("Run the archiver agent setup to register the native host".into()),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            detail: None,
        }
    }

    pub fn is_no_directory(&self) -> bool {
        self.error == Self::NO_DIRECTORY
    }

    pub fn is_agent_unavailable(&self) -> bool {
        self.error == Self::AGENT_UNAVAILABLE
    }
}

impl std::fmt::Display for RelayFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.error),
            None => f.write_str(&self.error),
        }
    }
}

// ---------------------------------------------------------------------------
// Relay → agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRequest {
    /// An empty `hashes` batch asks for the whole archive and marks the
    /// directory's cache as stale.
    Get {
        directory: String,
        hashes: Vec<String>,
    },
    Set {
        directory: String,
        url: String,
        hash: String,
        name: String,
        filename: String,
    },
    /// Serialized as `{"Pick": null}`.
    Pick(()),
}

impl AgentRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Get { .. } => "Get",
            Self::Set { .. } => "Set",
            Self::Pick(()) => "Pick",
        }
    }

    /// Build the agent request for a client `get`/`set`, enriched with the
    /// archive directory. `Configure` never reaches the agent.
    pub fn from_client(request: &ClientRequest, directory: &str) -> Option<Self> {
        match request {
            ClientRequest::Get { hashes } => Some(Self::Get {
                directory: directory.to_string(),
                hashes: hashes.clone(),
            }),
            ClientRequest::Set {
                hash,
                name,
                filename,
                url,
            } => Some(Self::Set {
                directory: directory.to_string(),
                url: url.clone(),
                hash: hash.clone(),
                name: name.clone(),
                filename: filename.clone(),
            }),
            ClientRequest::Configure(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent → relay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentReply {
    Failure { error: String },
    Message { msg: serde_json::Value },
}

impl AgentReply {
    /// Interpret the payload as a name map (`Get` and `Set` replies).
    pub fn into_names(self) -> Result<NameMap, String> {
        match self {
            Self::Failure { error } => Err(error),
            Self::Message { msg } => serde_json::from_value(msg)
                .map_err(|e| format!("malformed name map from agent: {e}")),
        }
    }

    /// Interpret the payload as a picked path (`Pick` replies).
    pub fn into_path(self) -> Result<String, String> {
        match self {
            Self::Failure { error } => Err(error),
            Self::Message { msg } => msg
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| "malformed pick reply from agent".to_string()),
        }
    }
}
