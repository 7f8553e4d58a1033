//! `archiver pick`: choose the archive directory with the agent's folder
//! picker and store it.

use std::path::Path;

use archiver_agent::{AgentConnector, AgentError, NativeAgent, one_shot};
use archiver_core::{AgentRequest, ConfigUpdate, Configuration};

use crate::cmd_config::apply_update;

pub async fn cmd_pick(socket_path: &str, config_path: &Path, agent: &str) -> anyhow::Result<()> {
    match pick_directory(&NativeAgent::new(agent)).await? {
        Some(directory) => {
            let config = apply_update(
                socket_path,
                config_path,
                ConfigUpdate {
                    directory: Some(directory),
                    prefer_original_filename: None,
                },
            )
            .await?;
            print_directory(&config);
        }
        None => eprintln!("cancelled"),
    }
    Ok(())
}

/// Ask the agent for a directory. `None` when the picker was dismissed.
pub(crate) async fn pick_directory<C: AgentConnector>(
    connector: &C,
) -> anyhow::Result<Option<String>> {
    let reply = one_shot(connector, AgentRequest::Pick(())).await?;
    let path = reply.into_path().map_err(AgentError::Reported)?;
    Ok(Some(path).filter(|p| !p.is_empty()))
}

fn print_directory(config: &Configuration) {
    println!("{}", config.directory().unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use archiver_agent::AgentConnection;
    use archiver_core::AgentReply;

    struct Picker(AgentReply);

    impl AgentConnector for Picker {
        fn connect(&self) -> Result<AgentConnection, AgentError> {
            let (connection, mut peer) = AgentConnection::in_memory();
            let reply = self.0.clone();
            tokio::spawn(async move {
                if let Some(AgentRequest::Pick(())) = peer.requests.recv().await {
                    let _ = peer.replies.send(reply);
                }
            });
            Ok(connection)
        }
    }

    #[tokio::test]
    async fn picked_path_is_returned() {
        let picker = Picker(AgentReply::Message {
            msg: serde_json::json!("/srv/archive"),
        });
        assert_eq!(
            pick_directory(&picker).await.unwrap().as_deref(),
            Some("/srv/archive")
        );
    }

    #[tokio::test]
    async fn empty_path_means_cancelled() {
        let picker = Picker(AgentReply::Message {
            msg: serde_json::json!(""),
        });
        assert_eq!(pick_directory(&picker).await.unwrap(), None);
    }

    #[tokio::test]
    async fn agent_failure_is_an_error() {
        let picker = Picker(AgentReply::Failure {
            error: "no display".into(),
        });
        let err = pick_directory(&picker).await.unwrap_err();
        assert!(err.to_string().contains("no display"));
    }
}
