//! Error types for the native agent boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to launch agent {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent message is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("agent frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("agent connection closed")]
    Disconnected,

    #[error("agent reported: {0}")]
    Reported(String),
}
