//! Command-line interface
//!
//! Handles argument parsing and logging configuration.

use crate::config::Overrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stream microphone audio to a broadcast server and play broadcasts back
#[derive(Parser, Debug)]
#[command(name = "soundcheck")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base endpoint, e.g. http://192.168.1.22:9080/broadcast
    #[arg(long, global = true, env = "SOUNDCHECK_SERVER_URL")]
    pub server_url: Option<String>,

    /// Broadcast identifier appended to the server URL
    #[arg(long, global = true, env = "SOUNDCHECK_BROADCAST_ID")]
    pub broadcast_id: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, global = true, env = "SOUNDCHECK_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// JSON config file (default: ./soundcheck.json if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log a fingerprint and level for every captured chunk
    #[arg(long, global = true)]
    pub diagnostics: bool,

    /// Increase logging verbosity (-v = debug, -vv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Capture the microphone and upload it until Ctrl-C
    Stream,
    /// Download the broadcast and play it until it ends or Ctrl-C
    Play,
    /// Delete the broadcast chunks stored on the server
    Cleanup,
    /// Toggle streaming and playback from stdin commands
    Interactive,
    /// List audio devices and the computed chunk size
    Devices,
}

impl Args {
    /// Log level for this crate's modules
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Command line values layered over the config file
    pub fn overrides(&self) -> Overrides {
        Overrides {
            server_url: self.server_url.clone(),
            broadcast_id: self.broadcast_id.clone(),
            auth_token: self.auth_token.clone(),
            diagnostics: self.diagnostics,
        }
    }
}

/// Initialize logging; `RUST_LOG` wins over `-v`
pub fn init_logging(args: &Args) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("soundcheck={}", args.log_level()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_options_after_subcommand() {
        let args = Args::try_parse_from([
            "soundcheck",
            "stream",
            "--server-url",
            "http://h/broadcast",
            "--broadcast-id",
            "X",
            "--auth-token",
            "T",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.command, Command::Stream);
        assert_eq!(args.log_level(), "trace");
        let overrides = args.overrides();
        assert_eq!(overrides.server_url.as_deref(), Some("http://h/broadcast"));
        assert_eq!(overrides.broadcast_id.as_deref(), Some("X"));
        assert_eq!(overrides.auth_token.as_deref(), Some("T"));
        assert!(!overrides.diagnostics);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["soundcheck"]).is_err());
    }

    #[test]
    fn default_level_is_info() {
        let args = Args::try_parse_from(["soundcheck", "devices"]).unwrap();
        assert_eq!(args.log_level(), "info");
        assert_eq!(args.command, Command::Devices);
    }
}
