//! Framed connection dengan buffered I/O
//!
//! Frame di atas socket:
//! ┌─────────────────────┬──────────────────────────────┐
//! │ length (u32 LE)     │ message bytes (length)       │
//! └─────────────────────┴──────────────────────────────┘
//!
//! Inbound buffer berada di mode Writing selama menerima dari socket, lalu
//! pindah ke Reading untuk di-parse. Frame yang belum lengkap tetap di buffer
//! dan dipadatkan ke depan saat kembali ke Writing.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::core::{ByteStream, StreamError};
use crate::protocol::{
    decode_and_learn, DecodeError, Document, EncodeError, ObjectEncoder, SymbolTable,
};

/// Ukuran length prefix
pub const FRAME_HEADER_SIZE: usize = 4;

/// Batas default panjang satu frame (16MB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Ruang minimal per `read()` dari socket
const READ_CHUNK: usize = 64 * 1024;

/// Buffer awal untuk frame keluar
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("buffer error: {0}")]
    Stream(#[from] StreamError),

    #[error("malformed message: {0}")]
    Decode(#[from] DecodeError),

    #[error("cannot encode message: {0}")]
    Encode(#[from] EncodeError),

    #[error("frame of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },

    #[error("connection closed by peer")]
    Closed,
}

/// Tulis satu frame (`u32` length + message) di cursor `out` (mode Writing).
///
/// Message di-encode langsung ke `out`, length prefix diisi belakangan.
/// Kalau encode gagal, `out` kembali ke posisi semula dan `symbols` tidak
/// berubah. Pengecualian: `Oversized` (message > 4GB) terdeteksi setelah
/// `symbols` diperbarui, jadi connection-nya harus ditutup.
///
/// Mengembalikan jumlah bytes yang ditambahkan.
pub fn write_frame(
    out: &mut ByteStream<'_>,
    doc: &Document,
    symbols: Option<&mut SymbolTable>,
) -> Result<usize, FrameError> {
    let start = out.position();
    out.write_u32(0)?;

    if let Err(e) = ObjectEncoder::new(&doc.arena).encode_into(&doc.root, symbols, out) {
        out.rewind_to(start);
        return Err(e.into());
    }

    let len = out.position() - start - FRAME_HEADER_SIZE;
    let prefix = match u32::try_from(len) {
        Ok(prefix) => prefix,
        Err(_) => {
            out.rewind_to(start);
            return Err(FrameError::Oversized {
                len,
                max: u32::MAX as usize,
            });
        }
    };
    out.patch_u32(start, prefix)?;
    Ok(FRAME_HEADER_SIZE + len)
}

/// Ambil payload frame berikutnya dari `inbound` (mode Reading).
///
/// `Ok(None)` kalau frame belum lengkap; cursor kembali ke awal frame.
pub fn read_frame<'s>(
    inbound: &'s mut ByteStream<'_>,
    max_frame_len: usize,
) -> Result<Option<&'s [u8]>, FrameError> {
    inbound.mark()?;
    let len = match inbound.read_u32() {
        Ok(len) => len as usize,
        Err(StreamError::InsufficientData { .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > max_frame_len {
        return Err(FrameError::Oversized {
            len,
            max: max_frame_len,
        });
    }
    if inbound.available_to_read() < len {
        inbound.reset()?;
        return Ok(None);
    }
    Ok(Some(inbound.read_bytes(len)?))
}

/// Connection wrapper dengan buffer inbound / outbound dan symbol table
/// per arah.
///
/// Kedua peer harus memakai `Connection` (atau urutan encode / decode yang
/// sama) supaya symbol table tetap sinkron. Frame yang gagal di-decode
/// membuat symbol table tidak bisa dipercaya lagi: tutup connection-nya.
pub struct Connection<S> {
    stream: S,
    inbound: ByteStream<'static>,
    outbound: ByteStream<'static>,
    rx_symbols: SymbolTable,
    tx_symbols: SymbolTable,
    max_frame_len: usize,
    peer_closed: bool,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, max_frame_len: usize) -> Result<Self, FrameError> {
        Ok(Self {
            stream,
            inbound: ByteStream::allocate(READ_CHUNK)?,
            outbound: ByteStream::allocate(WRITE_BUFFER_SIZE)?,
            rx_symbols: SymbolTable::new(),
            tx_symbols: SymbolTable::new(),
            max_frame_len,
            peer_closed: false,
        })
    }

    /// Satu `read()` dari socket langsung ke inbound buffer.
    ///
    /// Returns jumlah bytes baru; 0 kalau socket belum siap (WouldBlock)
    /// atau peer sudah menutup connection (lihat [`Connection::is_closed`]).
    #[inline]
    pub fn fill_read_buffer(&mut self) -> Result<usize, FrameError> {
        if self.peer_closed {
            return Ok(0);
        }
        loop {
            let spare = self.inbound.spare_mut(READ_CHUNK)?;
            match self.stream.read(spare) {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.inbound.advance(n)?;
                    return Ok(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decode semua frame lengkap yang sudah ada di inbound buffer
    pub fn poll_frames(&mut self) -> Result<Vec<Document>, FrameError> {
        self.inbound.enter_read_mode()?;

        let mut docs = Vec::new();
        let result = loop {
            match read_frame(&mut self.inbound, self.max_frame_len) {
                Ok(Some(payload)) => match decode_and_learn(payload, &mut self.rx_symbols) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => break Err(e.into()),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        // Compact: sisa frame parsial pindah ke depan
        if self.inbound.available_to_read() == 0 {
            self.inbound.clear();
        }
        self.inbound.enter_write_mode()?;
        result.map(|()| docs)
    }

    /// Encode `doc` ke outbound buffer. Belum dikirim sampai `flush`.
    #[inline]
    pub fn queue_frame(&mut self, doc: &Document) -> Result<usize, FrameError> {
        write_frame(&mut self.outbound, doc, Some(&mut self.tx_symbols))
    }

    /// Kirim outbound buffer ke socket sebanyak yang diterima kernel.
    ///
    /// Returns jumlah bytes yang terkirim. Sisa partial write tetap di buffer.
    pub fn flush(&mut self) -> Result<usize, FrameError> {
        let pending = self.outbound.position();
        let mut written = 0;

        while written < pending {
            match self.stream.write(&self.outbound.as_bytes()[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    )
                    .into());
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if written > 0 {
            // Buang yang sudah terkirim, sisanya geser ke depan
            self.outbound.enter_read_mode()?;
            self.outbound.skip(written)?;
            if self.outbound.available_to_read() == 0 {
                self.outbound.clear();
            }
            self.outbound.enter_write_mode()?;
        }
        Ok(written)
    }

    /// Bytes yang menunggu dikirim
    #[inline(always)]
    pub fn write_pending(&self) -> usize {
        self.outbound.position()
    }

    /// Bytes frame parsial yang belum lengkap
    #[inline(always)]
    pub fn read_pending(&self) -> usize {
        self.inbound.position()
    }

    #[inline(always)]
    pub fn is_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Dipakai untuk register / deregister di mio registry
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}
