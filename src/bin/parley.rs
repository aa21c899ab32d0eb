//! parley - console chat client
//!
//! # Usage
//!
//! ```text
//! parley                         # connect to 127.0.0.1:12345
//! parley --addr chat.lan:12345   # connect elsewhere
//! PARLEY_ADDR=chat.lan:12345 parley
//! ```
//!
//! Every line typed is sent to the server; `/help` lists the commands and
//! `/quit` leaves.

use std::env;
use std::process;

use anyhow::Result;
use clap::Parser;
use tokio::io::{self, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use parley_client::{ChatClient, Disconnect, DEFAULT_SERVER_ADDR};

/// Environment variable naming the server address.
const ADDR_ENV: &str = "PARLEY_ADDR";

/// parley console client
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Chat output owns stdout; diagnostics go to stderr and stay quiet by default.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let addr = args
        .addr
        .or_else(|| env::var(ADDR_ENV).ok())
        .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());

    println!("🔗 Connecting to chat server at {addr}...");
    let client = match ChatClient::connect(&addr).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };
    info!(addr = client.addr(), "Connected");
    println!("✅ Connected to server!");
    println!("💬 You can start chatting once you have a name. Type /help for commands.");

    let mut stdout = io::stdout();
    let outcome = client.run(BufReader::new(io::stdin()), &mut stdout).await?;
    debug!(?outcome, "Session ended");

    if outcome == Disconnect::Quit {
        println!("👋 Disconnected from server.");
    }
    Ok(())
}
