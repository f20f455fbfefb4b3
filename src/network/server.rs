//! Tablewire echo server dengan event-driven I/O
//!
//! Menggunakan mio untuk non-blocking I/O multiplexing. Setiap frame yang
//! masuk di-decode (symbol table inbound ikut belajar), lalu di-encode ulang
//! dan dikirim balik lewat symbol table outbound connection yang sama.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use super::connection::{Connection, FrameError, DEFAULT_MAX_FRAME_LEN};

const SERVER_TOKEN: Token = Token(0);
const EVENTS_CAPACITY: usize = 1024;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_frame_len: usize,
    pub max_connections: usize,
    /// Interval log statistik; `None` untuk mematikan
    pub stats_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9999)),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_connections: 1024,
            stats_interval: Some(Duration::from_secs(10)),
        }
    }
}

/// Server statistics
#[derive(Debug, Default)]
pub struct ServerStats {
    pub frames_received: AtomicU64,
    pub frames_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub frame_errors: AtomicU64,
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

impl ServerStats {
    pub fn log(&self, uptime: Duration) {
        let frames_in = self.frames_received.load(Ordering::Relaxed);
        let frames_out = self.frames_sent.load(Ordering::Relaxed);
        let secs = uptime.as_secs_f64().max(f64::EPSILON);

        let rate_in = frames_in as f64 / secs;

        info!(
            uptime_secs = secs,
            frames_in,
            frames_out,
            rate_in,
            bytes_in = self.bytes_received.load(Ordering::Relaxed),
            bytes_out = self.bytes_sent.load(Ordering::Relaxed),
            errors = self.frame_errors.load(Ordering::Relaxed),
            active = self.connections_active.load(Ordering::Relaxed),
            total = self.connections_total.load(Ordering::Relaxed),
            "server stats"
        );
    }
}

pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection<TcpStream>>,
    next_token: usize,
    config: ServerConfig,
    stats: ServerStats,
}

impl Server {
    pub fn bind(config: ServerConfig) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(config.bind_addr)?;

        poll.registry()
            .register(&mut listener, SERVER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            listener,
            connections: HashMap::with_capacity(config.max_connections),
            next_token: 1,
            config,
            stats: ServerStats::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Run server event loop (tidak pernah berhenti kecuali error)
    pub fn run(&mut self) -> io::Result<()> {
        self.run_until(&AtomicBool::new(false))
    }

    /// Run event loop sampai `stop` bernilai true
    pub fn run_until(&mut self, stop: &AtomicBool) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let started = Instant::now();
        let mut last_stats = started;

        info!(addr = %self.local_addr()?, "tablewire server listening");

        while !stop.load(Ordering::Relaxed) {
            self.poll_once(&mut events, Some(Duration::from_millis(10)))?;

            if let Some(interval) = self.config.stats_interval {
                if last_stats.elapsed() >= interval {
                    self.stats.log(started.elapsed());
                    last_stats = Instant::now();
                }
            }
        }

        info!("tablewire server stopped");
        self.stats.log(started.elapsed());
        Ok(())
    }

    /// Satu putaran poll + dispatch
    pub fn poll_once(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        for event in events.iter() {
            match event.token() {
                SERVER_TOKEN => self.accept_connections()?,
                token => {
                    if event.is_readable() || event.is_read_closed() {
                        self.handle_read(token);
                    }
                    if event.is_writable() {
                        self.handle_write(token);
                    }
                }
            }
        }
        Ok(())
    }

    /// Accept new connections
    fn accept_connections(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.connections.len() >= self.config.max_connections {
                        warn!(%addr, "max connections reached, rejecting");
                        continue;
                    }

                    // Disable Nagle's algorithm untuk lower latency
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%addr, error = %e, "set_nodelay failed");
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;

                    let conn = match Connection::new(stream, self.config.max_frame_len) {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(%addr, error = %e, "cannot allocate connection buffers");
                            continue;
                        }
                    };
                    self.connections.insert(token, conn);

                    self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                    self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                    info!(%addr, token = token.0, "new connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Handle readable event: baca sampai WouldBlock, echo semua frame lengkap
    fn handle_read(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        match echo_frames(conn, &self.stats) {
            Ok(()) if conn.is_closed() => self.close(token, None),
            Ok(()) => {}
            Err(e) => self.close(token, Some(e)),
        }
    }

    /// Handle writable event
    fn handle_write(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.write_pending() == 0 {
            return;
        }
        match conn.flush() {
            Ok(sent) => {
                self.stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
            }
            Err(e) => self.close(token, Some(e)),
        }
    }

    fn close(&mut self, token: Token, reason: Option<FrameError>) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
            debug!(token = token.0, error = %e, "deregister failed");
        }
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);

        match reason {
            Some(e) => {
                self.stats.frame_errors.fetch_add(1, Ordering::Relaxed);
                warn!(token = token.0, error = %e, "connection dropped");
            }
            None => info!(token = token.0, "connection closed"),
        }
    }
}

fn echo_frames(conn: &mut Connection<TcpStream>, stats: &ServerStats) -> Result<(), FrameError> {
    loop {
        let n = conn.fill_read_buffer()?;
        if n == 0 {
            break;
        }
        stats.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    let docs = conn.poll_frames()?;
    for doc in &docs {
        conn.queue_frame(doc)?;
    }

    if !docs.is_empty() {
        let count = docs.len() as u64;
        stats.frames_received.fetch_add(count, Ordering::Relaxed);
        stats.frames_sent.fetch_add(count, Ordering::Relaxed);
        debug!(frames = count, pending = conn.write_pending(), "echo");
    }

    let sent = conn.flush()?;
    stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
    Ok(())
}
