//! Tablewire Client Binary
//!
//! Load generator + verifier untuk tablewire_server:
//! - Kirim document (shared subtable + siklus) dalam batch
//! - Setiap echo dibandingkan secara struktural dengan yang dikirim
//! - Laporan latency per batch dan ukuran frame
//!
//! Usage:
//!   cargo run --release --bin tablewire_client -- --server 127.0.0.1:9999

use std::net::{SocketAddr, TcpStream};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tablewire::network::{Connection, FrameError, DEFAULT_MAX_FRAME_LEN};
use tablewire::protocol::{Document, Table, TableArena, Value};

/// Client configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "tablewire_client", version, about = "Tablewire echo client")]
struct ClientConfig {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    server: SocketAddr,

    /// Total messages to send
    #[arg(short = 'n', long, default_value_t = 10_000)]
    messages: usize,

    /// Messages per batch before waiting for echoes
    #[arg(short, long, default_value_t = 100)]
    batch: usize,

    /// Largest accepted frame in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame: usize,

    /// Socket read timeout in milliseconds
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

/// Document contoh: order dengan dua line item yang berbagi satu product,
/// dan parent link yang membuat siklus.
fn sample_order(seq: usize) -> Document {
    let mut arena = TableArena::new();

    let mut product = Table::new();
    product.set("sku", format!("SKU-{:04}", seq % 50));
    product.set("price", 19.99);
    let product = arena.insert(product);

    let order = arena.alloc();
    let mut items = Table::new();
    for qty in [1, 3] {
        let mut item = Table::new();
        item.set("product", product);
        item.set("qty", qty);
        item.set("order", order);
        items.push(arena.insert(item));
    }
    let items = arena.insert(items);

    if let Some(t) = arena.get_mut(order) {
        t.set("seq", seq as u32);
        t.set("status", if seq % 2 == 0 { "open" } else { "filled" });
        t.set("items", items);
        t.set("urgent", seq % 7 == 0);
    }
    Document::new(arena, Value::Table(order))
}

#[derive(Debug, Default)]
struct Report {
    sent: usize,
    verified: usize,
    mismatched: usize,
    bytes_sent: usize,
    first_frame: usize,
    last_frame: usize,
    batch_latency: Vec<Duration>,
}

impl Report {
    fn print(&self, elapsed: Duration) {
        info!(
            sent = self.sent,
            verified = self.verified,
            mismatched = self.mismatched,
            bytes = self.bytes_sent,
            secs = elapsed.as_secs_f64(),
            rate = self.sent as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
            "run complete"
        );
        info!(
            first = self.first_frame,
            last = self.last_frame,
            "frame size (bytes); later frames reuse the symbol table"
        );

        let mut latency = self.batch_latency.clone();
        latency.sort_unstable();
        if let (Some(min), Some(max)) = (latency.first(), latency.last()) {
            let p50 = latency[latency.len() / 2];
            let p99 = latency[(latency.len() * 99 / 100).min(latency.len() - 1)];
            info!(?min, ?p50, ?p99, ?max, "batch round-trip latency");
        }
    }
}

fn run(config: &ClientConfig) -> Result<Report, FrameError> {
    let stream = TcpStream::connect(config.server)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_millis(config.timeout_ms)))?;

    let mut conn = Connection::new(stream, config.max_frame)?;
    let mut report = Report::default();
    let batch = config.batch.max(1);

    let mut seq = 0;
    while seq < config.messages {
        let count = batch.min(config.messages - seq);
        let docs: Vec<Document> = (seq..seq + count).map(sample_order).collect();

        let started = Instant::now();
        for doc in &docs {
            let len = conn.queue_frame(doc)?;
            if report.sent == 0 {
                report.first_frame = len;
            }
            report.last_frame = len;
            report.sent += 1;
            report.bytes_sent += len;
        }
        while conn.write_pending() > 0 {
            conn.flush()?;
        }

        let mut echoed = Vec::with_capacity(count);
        while echoed.len() < count {
            if conn.is_closed() {
                return Err(FrameError::Closed);
            }
            if conn.fill_read_buffer()? == 0 && !conn.is_closed() {
                warn!(waiting = count - echoed.len(), "read timed out");
                return Err(FrameError::Closed);
            }
            echoed.extend(conn.poll_frames()?);
        }
        report.batch_latency.push(started.elapsed());

        for (sent, got) in docs.iter().zip(&echoed) {
            if sent.structurally_eq(got) {
                report.verified += 1;
            } else {
                report.mismatched += 1;
                warn!(seq, "echo does not match sent document");
            }
        }

        debug!(seq, count, "batch verified");
        seq += count;
    }

    Ok(report)
}

fn main() -> ExitCode {
    let config = ClientConfig::parse();

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();

    info!(server = %config.server, messages = config.messages, batch = config.batch, "connecting");

    let started = Instant::now();
    match run(&config) {
        Ok(report) => {
            report.print(started.elapsed());
            if report.mismatched == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "client failed");
            ExitCode::FAILURE
        }
    }
}
