//! Tablewire Server Binary
//!
//! Echo server untuk framed object-graph messages:
//! - Setiap frame di-decode lalu di-encode ulang dan dikirim balik
//! - Symbol table per connection, jadi message berulang makin kecil
//! - TCP_NODELAY enabled
//!
//! Usage:
//!   cargo run --release --bin tablewire_server -- [OPTIONS]
//!   RUST_LOG=tablewire=debug cargo run --bin tablewire_server

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use tablewire::network::{Server, ServerConfig, DEFAULT_MAX_FRAME_LEN};

#[derive(Debug, Parser)]
#[command(name = "tablewire_server", version, about = "Tablewire echo server")]
struct Cli {
    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0:9999")]
    bind: SocketAddr,

    /// Largest accepted frame in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame: usize,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = 1024)]
    max_connections: usize,

    /// Seconds between stats lines (0 disables)
    #[arg(long, default_value_t = 10)]
    stats_secs: u64,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            bind_addr: cli.bind,
            max_frame_len: cli.max_frame,
            max_connections: cli.max_connections,
            stats_interval: (cli.stats_secs > 0).then(|| Duration::from_secs(cli.stats_secs)),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();

    let config = ServerConfig::from(cli);
    let mut server = match Server::bind(config.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!(addr = %config.bind_addr, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    // Stop dari thread stdin: ketik "q" + Enter
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut line = String::new();
            while std::io::stdin().read_line(&mut line).map_or(false, |n| n > 0) {
                if line.trim() == "q" {
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
                line.clear();
            }
        });
    }

    match server.run_until(&stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server loop failed");
            ExitCode::FAILURE
        }
    }
}
