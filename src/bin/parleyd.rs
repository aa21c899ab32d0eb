//! parley daemon - multithreaded chat server
//!
//! Accepts line-oriented TCP connections, assigns each a unique name and
//! relays broadcast, private and system messages between them.
//!
//! # Usage
//!
//! ```bash
//! # Start the server (foreground)
//! parleyd start
//!
//! # Start the server (background/daemonized)
//! parleyd start -d
//!
//! # Stop the server
//! parleyd stop
//!
//! # Check server status
//! parleyd status
//!
//! # Listen elsewhere
//! PARLEY_BIND=127.0.0.1:4000 parleyd start
//!
//! # Enable debug logging
//! RUST_LOG=parleyd=debug parleyd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (every session is told and torn down)

use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parleyd::config::{ServerConfig, BIND_ENV, CONFIG_ENV};
use parleyd::pidfile::{self, PidFile};
use parleyd::registry::spawn_registry;
use parleyd::server::ChatServer;

/// parley chat server
#[derive(Parser, Debug)]
#[command(name = "parleyd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Address to listen on (overrides config file and PARLEY_BIND)
        #[arg(short, long)]
        bind: Option<String>,

        /// Path to the TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Stop the running server
    Stop,
    /// Show server status
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        bind: None,
        config: None,
    });

    let pid_file = PidFile::default_location();

    match command {
        Command::Start {
            daemon,
            bind,
            config,
        } => {
            if let Some(pid) = pid_file.running_pid() {
                eprintln!("Server is already running (PID {pid})");
                eprintln!("Use 'parleyd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve config before forking so errors reach the terminal.
            let config = load_config(config, bind)?;

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize(&pidfile::default_log_path())?;
            }

            pid_file.write_current()?;
            let result = run_server(config);
            pid_file.remove();

            result
        }
        Command::Stop => {
            let Some(pid) = pid_file.running_pid() else {
                println!("Server is not running.");
                return Ok(());
            };

            println!("Stopping server (PID {pid})...");
            pidfile::terminate(pid)?;

            for _ in 0..50 {
                if !pidfile::is_process_running(pid) {
                    println!("Server stopped.");
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(100));
            }

            eprintln!("Server did not stop within 5 seconds.");
            process::exit(1);
        }
        Command::Status => {
            let Some(pid) = pid_file.running_pid() else {
                println!("Server is not running.");
                process::exit(1);
            };

            println!("Server is running (PID {pid})");
            Ok(())
        }
    }
}

/// Resolves the server config: file, then `PARLEY_BIND`, then `--bind`.
fn load_config(path: Option<PathBuf>, bind: Option<String>) -> Result<ServerConfig> {
    let path = path
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(ServerConfig::default_path);

    let mut config = match &path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    config.override_bind(env::var(BIND_ENV).ok().as_deref())?;
    config.override_bind(bind.as_deref())?;
    Ok(config)
}

/// Daemonizes the current process, sending stdout/stderr to `log_path`.
fn daemonize(log_path: &Path) -> Result<()> {
    use daemonize::Daemonize;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to open log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parleyd=info".parse()?)
                .add_directive("parley_core=info".parse()?)
                .add_directive("parley_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "parley server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    info!("Registry started");

    let server = ChatServer::bind(&config, registry, cancel_token)
        .await
        .context("Cannot start chat server")?;

    info!(
        addr = %server.local_addr(),
        commands = "/users, /private <username> <message>, /help, /quit",
        "Waiting for connections"
    );

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("parley server stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
