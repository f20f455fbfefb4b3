//! Core module: Byte Stream + Varint
//!
//! Prinsip desain:
//! - Satu buffer, dua mode: tulis pesan lalu baca balik tanpa copy
//! - Borrowed view untuk bytes yang diterima dari socket (zero-copy)
//! - Read gagal tanpa menggeser cursor, sehingga caller bisa retry

mod byte_stream;
mod varint;

pub use byte_stream::{grown_capacity, ByteStream, Mode, StreamError, MIN_CAPACITY};
pub use varint::{encoded_len, MAX_U30_BYTES};
