//! ChainRelay CLI.
//!
//! # Commands
//! ```text
//! chainrelay serve       --config <config.yaml>
//! chainrelay fingerprint --file <profile.yaml> [--gm-tls] [--tx-timestamp]
//! chainrelay profile     --file <profile.yaml>
//! chainrelay key         --token <subscribeId>
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd_inspect;
mod cmd_serve;

#[derive(Parser)]
#[command(
    name = "chainrelay",
    about = "Chaincode event relay: HTTP API, replay and broker forwarding",
    long_about = "
ChainRelay subscribes to chaincode events on permissioned ledger networks,
replays history on request and forwards every event to a message broker.

`serve` runs against the built-in in-memory ledger: chains named in the
config are simulated in process, and no peer or orderer is contacted.

ENVIRONMENT VARIABLES:
  CHAINRELAY_CONFIG   Path to the relay config (serve)
  CHAINRELAY_PORT     Overrides server.port
  RUST_LOG            Overrides logging directives
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server against the in-process in-memory ledger
    Serve {
        /// Relay config file
        #[arg(short, long, env = "CHAINRELAY_CONFIG", default_value = chainrelay_server::DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Print the pool key of a connection profile
    Fingerprint {
        /// Connection profile (YAML)
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        gm_tls: bool,
        #[arg(long)]
        tx_timestamp: bool,
    },

    /// Parse a connection profile and print what the relay reads from it
    Profile {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Decode a subscription id
    Key {
        #[arg(short, long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => cmd_serve::run(&config).await,
        Commands::Fingerprint { file, gm_tls, tx_timestamp } => {
            cmd_inspect::fingerprint(&file, gm_tls, tx_timestamp)
        }
        Commands::Profile { file } => cmd_inspect::profile(&file),
        Commands::Key { token } => cmd_inspect::key(&token),
    }
}
