//! Network Layer: Framed Transport
//!
//! Menggunakan mio untuk cross-platform async I/O.
//!
//! Fitur:
//! - Non-blocking I/O dengan epoll/kqueue/IOCP
//! - Length-prefixed frame di atas ByteStream (partial frame aman)
//! - Symbol table per connection per arah
//!
//! `Connection` generic atas `Read + Write`, jadi client blocking
//! (`std::net::TcpStream`) memakai framing yang sama dengan server.

mod connection;
mod server;

pub use connection::{
    read_frame, write_frame, Connection, FrameError, DEFAULT_MAX_FRAME_LEN, FRAME_HEADER_SIZE,
};
pub use server::{Server, ServerConfig, ServerStats};
