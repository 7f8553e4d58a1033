//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "archiver", about = "Named media archiving relay")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/archiver/relay.sock)
    #[arg(long, short = 's', global = true, env = "ARCHIVER_SOCKET")]
    pub socket_path: Option<String>,

    /// Configuration file (default: ~/.config/archiver/config.json)
    #[arg(long, global = true, env = "ARCHIVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Native agent executable
    #[arg(long, global = true, env = "ARCHIVER_AGENT", default_value = "archiver-agent")]
    pub agent: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the relay (connection manager + UDS server)
    Relay,
    /// Drive one client session: UI events on stdin, bindings on stdout (JSON lines)
    Session,
    /// Look up archived names for content hashes
    Get(GetOpts),
    /// Show or change the configuration
    Config(ConfigOpts),
    /// Choose the archive directory with the agent's folder picker
    Pick,
}

#[derive(clap::Args)]
pub struct GetOpts {
    /// Content hashes to look up
    #[arg(required = true)]
    pub hashes: Vec<String>,
}

#[derive(clap::Args, Default)]
pub struct ConfigOpts {
    /// Archive directory
    #[arg(long, conflicts_with = "clear_directory")]
    pub directory: Option<String>,

    /// Unset the archive directory
    #[arg(long)]
    pub clear_directory: bool,

    /// Name archived files after the original filename rather than the current one
    #[arg(long)]
    pub prefer_original_filename: Option<bool>,
}

impl ConfigOpts {
    pub fn to_update(&self) -> Option<archiver_core::ConfigUpdate> {
        let directory = if self.clear_directory {
            Some(String::new())
        } else {
            self.directory.clone()
        };
        if directory.is_none() && self.prefer_original_filename.is_none() {
            return None;
        }
        Some(archiver_core::ConfigUpdate {
            directory,
            prefer_original_filename: self.prefer_original_filename,
        })
    }
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/archiver/relay.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/archiver-{user}/relay.sock")
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_global_socket() {
        let cli = Cli::try_parse_from(["archiver", "get", "abc", "def", "-s", "/tmp/r.sock"]).unwrap();
        assert_eq!(cli.socket_path.as_deref(), Some("/tmp/r.sock"));
        let Command::Get(opts) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(opts.hashes, vec!["abc", "def"]);
    }

    #[test]
    fn get_requires_a_hash() {
        assert!(Cli::try_parse_from(["archiver", "get"]).is_err());
    }

    #[test]
    fn config_without_flags_is_a_query() {
        assert!(ConfigOpts::default().to_update().is_none());
    }

    #[test]
    fn config_flags_become_an_update() {
        let cli = Cli::try_parse_from([
            "archiver",
            "config",
            "--directory",
            "/srv/archive",
            "--prefer-original-filename",
            "false",
        ])
        .unwrap();
        let Command::Config(opts) = cli.command else {
            panic!("expected config");
        };
        let update = opts.to_update().unwrap();
        assert_eq!(update.directory.as_deref(), Some("/srv/archive"));
        assert_eq!(update.prefer_original_filename, Some(false));
    }

    #[test]
    fn clear_directory_sends_empty_directory() {
        let opts = ConfigOpts {
            clear_directory: true,
            ..ConfigOpts::default()
        };
        assert_eq!(opts.to_update().unwrap().directory.as_deref(), Some(""));
    }

    #[test]
    fn directory_and_clear_conflict() {
        assert!(
            Cli::try_parse_from(["archiver", "config", "--directory", "/x", "--clear-directory"])
                .is_err()
        );
    }
}
