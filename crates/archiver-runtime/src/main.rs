//! archiver: relay between media documents and the native archiving agent.
//! One binary for the relay process, stdio client sessions and one-shot
//! lookups.

use std::path::PathBuf;

use clap::Parser;

mod cli;
mod client;
mod cmd_config;
mod cmd_get;
mod cmd_pick;
mod cmd_relay;
mod cmd_session;

fn init_tracing() {
    let filter = std::env::var("ARCHIVER_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    // stdout carries protocol output for `session`; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    explicit
        .or_else(archiver_relay::config_store::default_config_path)
        .ok_or_else(|| anyhow::anyhow!("no config path: set --config or HOME"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Relay => {
            init_tracing();
            tracing::info!("archiver relay starting");
            let config = config_path(args.config)?;
            cmd_relay::run_relay(&socket_path, &config, &args.agent).await?;
        }
        cli::Command::Session => {
            init_tracing();
            cmd_session::cmd_session(&socket_path).await?;
        }
        cli::Command::Get(opts) => {
            cmd_get::cmd_get(&socket_path, opts.hashes).await?;
        }
        cli::Command::Config(opts) => {
            let config = config_path(args.config)?;
            cmd_config::cmd_config(&socket_path, &config, opts.to_update()).await?;
        }
        cli::Command::Pick => {
            let config = config_path(args.config)?;
            cmd_pick::cmd_pick(&socket_path, &config, &args.agent).await?;
        }
    }

    Ok(())
}
