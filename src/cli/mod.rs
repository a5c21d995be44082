//! CLI module for Tether
//!
//! Provides commands:
//! - `serve`: run the HTTP server (default)
//! - `watch`: follow a session's stream with the reconnecting client
//! - `run`: spawn a command through the API and watch it

use clap::{Parser, Subcommand};
use tether_protocol::ExecutionMode;
use uuid::Uuid;

pub mod run;
pub mod watch;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

/// Tether execution streaming server
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Run external processes and stream their output to many observers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where a client command finds the server
#[derive(clap::Args, Debug, Clone)]
pub struct ServerArgs {
    /// Server base URL
    #[arg(long, env = "TETHER_SERVER_URL", default_value = DEFAULT_SERVER)]
    pub server: String,
    /// Bearer token
    #[arg(long, env = "TETHER_TOKEN")]
    pub token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Print a session's output as it streams
    Watch {
        /// Session id
        session_id: Uuid,
        /// Resume after this sequence number
        #[arg(long)]
        last_sequence: Option<u64>,
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Spawn a command on the server and watch it
    Run {
        /// Output dialect of the command
        #[arg(long, default_value = "interactive")]
        mode: ExecutionMode,
        /// Working directory on the server (defaults to the current directory)
        #[arg(long)]
        cwd: Option<std::path::PathBuf>,
        #[command(flatten)]
        server: ServerArgs,
        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None | Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Watch {
            session_id,
            last_sequence,
            server,
        }) => watch::run(&server, session_id, last_sequence).await,
        Some(Commands::Run {
            mode,
            cwd,
            server,
            command,
        }) => run::run(&server, mode, cwd, command).await,
    }
}
