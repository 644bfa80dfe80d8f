//! ClipVault daemon
//!
//! Polls the clipboard, records history, and serves the presentation shell over
//! a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! clipvault
//!
//! # Custom config and a faster poll
//! clipvault --config /path/to/config.toml --interval 200
//!
//! # No display server: use the in-memory clipboard
//! clipvault --headless
//! ```

use clipvault_service::config::ClipboardBackend;
use clipvault_service::{ClipVaultServer, Config, ServerError};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line overrides applied on top of the config file
#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    socket_path: Option<PathBuf>,
    interval_ms: Option<u64>,
    headless: bool,
}

/// Parse command line arguments
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("ClipVault v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--headless" => {
                parsed.headless = true;
            }
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--db" => {
                i += 1;
                if i < args.len() {
                    parsed.db_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--socket" => {
                i += 1;
                if i < args.len() {
                    parsed.socket_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--interval" => {
                i += 1;
                if i < args.len() {
                    match args[i].parse() {
                        Ok(interval) => parsed.interval_ms = Some(interval),
                        Err(_) => eprintln!("Ignoring invalid interval: {}", args[i]),
                    }
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Use --help for usage information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"ClipVault - Clipboard history daemon

USAGE:
    clipvault [OPTIONS]

OPTIONS:
    -h, --help              Show this help message
    -v, --version           Show version
    -c, --config <PATH>     Path to configuration file (default: <config dir>/clipvault/config.toml)
    --db <PATH>             Database path (default: <data dir>/clipvault/clipvault.sqlite)
    --socket <PATH>         Unix socket path (default: /tmp/clipvault.sock)
    --interval <MS>         Clipboard polling interval in milliseconds (default: 450)
    --headless              Use an in-memory clipboard instead of the system one

ENVIRONMENT:
    RUST_LOG                Log filter, overrides general.log_level
"#
    );
}

fn load_config(args: &Args) -> Config {
    let mut config = match &args.config_path {
        Some(path) => Config::load_from_path(path.clone()),
        None => Config::load(),
    };

    if let Some(db_path) = &args.db_path {
        config.storage.db_path = db_path.clone();
    }
    if let Some(socket_path) = &args.socket_path {
        config.server.socket_path = socket_path.clone();
    }
    if let Some(interval_ms) = args.interval_ms {
        config.polling.interval_ms = interval_ms;
    }
    if args.headless {
        config.clipboard.backend = ClipboardBackend::Memory;
    }
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    // Loaded before logging is up, so the loader's own messages are not shown
    let config = load_config(&args);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("Starting ClipVault...");

    let server = ClipVaultServer::new(config)?;
    server.log_stats().await;

    println!("Socket: {:?}", server.socket_path());
    println!("Press Ctrl+C to stop");

    // Handle shutdown gracefully
    let outcome = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            println!("\nShutting down...");
        })
        .await;

    match outcome {
        // the socket belongs to the running instance; leave it alone
        Err(e @ ServerError::AlreadyRunning(_)) => {
            error!("{}", e);
            return Err(e.into());
        }
        Err(e) => error!("Server error: {}", e),
        Ok(()) => {}
    }

    server.shutdown().await;

    Ok(())
}
