//! Mode-Switching Byte Stream
//!
//! Satu buffer untuk dua arah:
//! - Writing: append di cursor, buffer tumbuh otomatis (kecuali borrowed)
//! - Reading: baca dari cursor sampai `total`, gagal tanpa menggeser cursor
//! - Switch balik ke Writing memadatkan sisa yang belum dibaca ke depan
//!
//! Pola terakhir ini dipakai connection layer: terima bytes dari socket,
//! parse sebanyak mungkin, sisa frame yang belum lengkap tetap di buffer.

use thiserror::Error;

/// Default capacity ketika `allocate(0)`
pub const MIN_CAPACITY: usize = 128;

/// Di bawah ukuran ini buffer tumbuh ke power of two berikutnya
const POW2_GROWTH_LIMIT: usize = 4096;

/// Alignment untuk pertumbuhan buffer besar
const LARGE_GROWTH_ALIGN: usize = 64;

/// Arah operasi stream saat ini
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Writing,
    Reading,
}

/// Error dari operasi buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Read meminta lebih banyak bytes dari yang tersedia. Cursor tidak bergeser;
    /// `needed` adalah jumlah bytes tambahan yang dibutuhkan.
    #[error("insufficient data: {needed} more byte(s) required")]
    InsufficientData { needed: usize },

    #[error("stream is in {actual:?} mode, expected {expected:?}")]
    WrongMode { expected: Mode, actual: Mode },

    /// Borrowed buffer tidak boleh di-realokasi
    #[error("borrowed buffer has no room for {requested} more byte(s)")]
    Borrowed { requested: usize },

    #[error("failed to grow buffer to {requested} bytes")]
    AllocationFailure { requested: usize },
}

enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
    BorrowedMut(&'a mut [u8]),
}

impl Storage<'_> {
    #[inline(always)]
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(buf) => buf,
            Storage::Borrowed(buf) => buf,
            Storage::BorrowedMut(buf) => buf,
        }
    }

    #[inline(always)]
    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            Storage::Owned(buf) => Some(buf),
            Storage::Borrowed(_) => None,
            Storage::BorrowedMut(buf) => Some(buf),
        }
    }
}

/// Growable byte buffer dengan cursor, mode flag, dan mark/reset.
///
/// Invariant: `offset <= total <= capacity` selama mode Reading. Buffer
/// borrowed tidak pernah tumbuh; lifetime `'a` menjamin stream tidak hidup
/// lebih lama dari memori pemiliknya.
pub struct ByteStream<'a> {
    storage: Storage<'a>,
    total: usize,
    offset: usize,
    mark: usize,
    mode: Mode,
}

impl ByteStream<'static> {
    /// Buffer baru milik stream, mode Writing, cursor 0.
    ///
    /// `hint = 0` memakai [`MIN_CAPACITY`].
    pub fn allocate(hint: usize) -> Result<Self, StreamError> {
        let capacity = if hint == 0 { MIN_CAPACITY } else { hint };
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| StreamError::AllocationFailure {
                requested: capacity,
            })?;
        buf.resize(capacity, 0);

        Ok(Self {
            storage: Storage::Owned(buf),
            total: capacity,
            offset: 0,
            mark: 0,
            mode: Mode::Writing,
        })
    }
}

impl<'a> ByteStream<'a> {
    /// Read-only view di atas memori caller (zero-copy), langsung mode Reading.
    pub fn wrap(bytes: &'a [u8]) -> Self {
        Self {
            total: bytes.len(),
            storage: Storage::Borrowed(bytes),
            offset: 0,
            mark: 0,
            mode: Mode::Reading,
        }
    }

    /// Seperti [`ByteStream::wrap`], tapi boleh ditulis selama masih muat.
    pub fn wrap_mut(bytes: &'a mut [u8]) -> Self {
        Self {
            total: bytes.len(),
            storage: Storage::BorrowedMut(bytes),
            offset: 0,
            mark: 0,
            mode: Mode::Reading,
        }
    }

    #[inline(always)]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline(always)]
    pub fn is_borrowed(&self) -> bool {
        !matches!(self.storage, Storage::Owned(_))
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.storage.as_slice().len()
    }

    /// Posisi cursor saat ini
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bytes yang bisa dibaca: `total - offset` di mode Reading, selain itu 0
    #[inline(always)]
    pub fn available_to_read(&self) -> usize {
        match self.mode {
            Mode::Reading => self.total - self.offset,
            Mode::Writing => 0,
        }
    }

    /// Data yang valid: yang sudah ditulis (Writing) atau seluruh isi yang
    /// bisa dibaca termasuk yang sudah dikonsumsi (Reading).
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        let end = match self.mode {
            Mode::Writing => self.offset,
            Mode::Reading => self.total,
        };
        &self.storage.as_slice()[..end]
    }

    /// Sisa yang belum dibaca (zero-copy)
    #[inline(always)]
    pub fn remaining(&self) -> &[u8] {
        match self.mode {
            Mode::Reading => &self.storage.as_slice()[self.offset..self.total],
            Mode::Writing => &[],
        }
    }

    /// Konsumsi stream menjadi `Vec` berisi data valid.
    pub fn into_vec(self) -> Vec<u8> {
        let end = match self.mode {
            Mode::Writing => self.offset,
            Mode::Reading => self.total,
        };
        match self.storage {
            Storage::Owned(mut buf) => {
                buf.truncate(end);
                buf
            }
            Storage::Borrowed(buf) => buf[..end].to_vec(),
            Storage::BorrowedMut(buf) => buf[..end].to_vec(),
        }
    }

    // ------------------------------------------------------------------
    // Mode switching
    // ------------------------------------------------------------------

    /// Writing → Reading. Semua yang sudah ditulis menjadi bisa dibaca.
    pub fn enter_read_mode(&mut self) -> Result<(), StreamError> {
        self.expect_mode(Mode::Writing)?;
        self.total = self.offset;
        self.offset = 0;
        self.mark = 0;
        self.mode = Mode::Reading;
        Ok(())
    }

    /// Reading → Writing.
    ///
    /// Kalau sebagian sudah dibaca (`0 < offset < total`), sisa
    /// `[offset, total)` digeser ke depan dan cursor tulis ditaruh tepat
    /// setelahnya. Selain itu cursor ditaruh di akhir data lama, termasuk
    /// kalau semua sudah dibaca: panggil [`ByteStream::clear`] dulu untuk
    /// mulai dari 0.
    pub fn enter_write_mode(&mut self) -> Result<(), StreamError> {
        self.expect_mode(Mode::Reading)?;

        let (offset, total) = (self.offset, self.total);
        if offset > 0 && offset < total {
            let unread = total - offset;
            match self.storage.as_mut_slice() {
                Some(buf) => buf.copy_within(offset..total, 0),
                None => return Err(StreamError::Borrowed { requested: unread }),
            }
            self.offset = unread;
        } else {
            self.offset = total;
        }

        self.mark = 0;
        self.total = self.capacity();
        self.mode = Mode::Writing;
        Ok(())
    }

    /// Simpan posisi baca untuk parsing spekulatif
    pub fn mark(&mut self) -> Result<(), StreamError> {
        self.expect_mode(Mode::Reading)?;
        self.mark = self.offset;
        Ok(())
    }

    /// Kembalikan cursor ke posisi `mark()` terakhir
    pub fn reset(&mut self) -> Result<(), StreamError> {
        self.expect_mode(Mode::Reading)?;
        self.offset = self.mark;
        Ok(())
    }

    /// Hard reset `offset = total = 0` di mode apa pun, kapasitas tetap
    pub fn clear(&mut self) {
        self.offset = 0;
        self.mark = 0;
        self.total = 0;
    }

    #[inline(always)]
    fn expect_mode(&self, expected: Mode) -> Result<(), StreamError> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(StreamError::WrongMode {
                expected,
                actual: self.mode,
            })
        }
    }

    pub(crate) fn rewind_to(&mut self, position: usize) {
        debug_assert!(position <= self.offset);
        self.offset = position;
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Pastikan ada ruang untuk `additional` bytes setelah cursor.
    pub fn reserve(&mut self, additional: usize) -> Result<(), StreamError> {
        let target = self
            .offset
            .checked_add(additional)
            .ok_or(StreamError::AllocationFailure {
                requested: usize::MAX,
            })?;

        match &mut self.storage {
            Storage::Owned(buf) => {
                if target > buf.len() {
                    let new_capacity = grown_capacity(target);
                    buf.try_reserve_exact(new_capacity - buf.len())
                        .map_err(|_| StreamError::AllocationFailure {
                            requested: new_capacity,
                        })?;
                    buf.resize(new_capacity, 0);
                    if self.mode == Mode::Writing {
                        self.total = new_capacity;
                    }
                }
                Ok(())
            }
            Storage::Borrowed(_) => Err(StreamError::Borrowed {
                requested: additional,
            }),
            Storage::BorrowedMut(buf) => {
                if target > buf.len() {
                    Err(StreamError::Borrowed {
                        requested: additional,
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.reserve(bytes.len())?;
        let start = self.offset;
        let end = start + bytes.len();
        let buf = self.storage.as_mut_slice().ok_or(StreamError::Borrowed {
            requested: bytes.len(),
        })?;
        buf[start..end].copy_from_slice(bytes);
        self.offset = end;
        if self.mode == Mode::Reading && self.total < end {
            self.total = end;
        }
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.write_bytes(&[value])
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> Result<(), StreamError> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<(), StreamError> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> Result<(), StreamError> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) -> Result<(), StreamError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Ruang kosong setelah cursor, minimal `min` bytes (tumbuh kalau perlu).
    ///
    /// Dipakai untuk `read()` socket langsung ke buffer; lanjutkan dengan
    /// [`ByteStream::advance`].
    pub fn spare_mut(&mut self, min: usize) -> Result<&mut [u8], StreamError> {
        self.expect_mode(Mode::Writing)?;
        self.reserve(min)?;
        let start = self.offset;
        let buf = self
            .storage
            .as_mut_slice()
            .ok_or(StreamError::Borrowed { requested: min })?;
        Ok(&mut buf[start..])
    }

    /// Tandai `n` bytes dari `spare_mut` sebagai sudah ditulis
    #[inline]
    pub fn advance(&mut self, n: usize) -> Result<(), StreamError> {
        self.expect_mode(Mode::Writing)?;
        self.offset = self.offset.saturating_add(n).min(self.capacity());
        Ok(())
    }

    /// Timpa `u32` yang sudah ditulis di `at` (length prefix yang diisi
    /// belakangan)
    pub fn patch_u32(&mut self, at: usize, value: u32) -> Result<(), StreamError> {
        self.expect_mode(Mode::Writing)?;
        let end = at.saturating_add(4);
        if end > self.offset {
            return Err(StreamError::InsufficientData {
                needed: end - self.offset,
            });
        }
        let buf = self
            .storage
            .as_mut_slice()
            .ok_or(StreamError::Borrowed { requested: 4 })?;
        buf[at..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Ambil `n` bytes dari cursor. Gagal tanpa efek samping kalau kurang.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], StreamError> {
        self.expect_mode(Mode::Reading)?;
        let available = self.total - self.offset;
        if n > available {
            return Err(StreamError::InsufficientData {
                needed: n - available,
            });
        }
        let start = self.offset;
        self.offset += n;
        Ok(&self.storage.as_slice()[start..start + n])
    }

    /// Isi `out` penuh dari stream
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<(), StreamError> {
        let bytes = self.read_bytes(out.len())?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    /// Lewati `n` bytes
    #[inline]
    pub fn skip(&mut self, n: usize) -> Result<(), StreamError> {
        self.read_bytes(n).map(|_| ())
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut out = [0u8; N];
        self.read_into(&mut out)?;
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        self.read_array().map(u16::from_le_bytes)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        self.read_array().map(u32::from_le_bytes)
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        self.read_array().map(u64::from_le_bytes)
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64, StreamError> {
        self.read_array().map(f64::from_le_bytes)
    }
}

impl std::fmt::Debug for ByteStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("mode", &self.mode)
            .field("offset", &self.offset)
            .field("total", &self.total)
            .field("mark", &self.mark)
            .field("capacity", &self.capacity())
            .field("borrowed", &self.is_borrowed())
            .finish()
    }
}

/// Ukuran buffer baru untuk menampung `target` bytes.
///
/// Kecil: power of two berikutnya (min 128). Besar: +25%, dibulatkan ke 64.
pub fn grown_capacity(target: usize) -> usize {
    if target <= POW2_GROWTH_LIMIT {
        return target.max(MIN_CAPACITY).next_power_of_two();
    }
    let padded = target.saturating_add(target / 4);
    padded.saturating_add(LARGE_GROWTH_ALIGN - 1) & !(LARGE_GROWTH_ALIGN - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_default_capacity() {
        let stream = ByteStream::allocate(0).unwrap();
        assert_eq!(stream.capacity(), MIN_CAPACITY);
        assert_eq!(stream.mode(), Mode::Writing);
        assert_eq!(stream.position(), 0);
        assert!(!stream.is_borrowed());
    }

    #[test]
    fn test_growth_policy() {
        assert_eq!(grown_capacity(1), 128);
        assert_eq!(grown_capacity(129), 256);
        assert_eq!(grown_capacity(4096), 4096);
        // 5000 * 1.25 = 6250 -> 6272
        assert_eq!(grown_capacity(5000), 6272);
        assert_eq!(grown_capacity(4097) % 64, 0);
    }

    #[test]
    fn test_write_grows_and_preserves() {
        let mut stream = ByteStream::allocate(0).unwrap();
        let payload: Vec<u8> = (0..200u8).collect();
        stream.write_bytes(&payload).unwrap();
        assert_eq!(stream.capacity(), 256);
        assert_eq!(stream.as_bytes(), &payload[..]);
    }

    #[test]
    fn test_typed_roundtrip() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_u8(0xAB).unwrap();
        stream.write_u16(0xBEEF).unwrap();
        stream.write_u32(0xDEAD_BEEF).unwrap();
        stream.write_u64(u64::MAX - 1).unwrap();
        stream.write_f64(-1.5).unwrap();
        stream.enter_read_mode().unwrap();

        assert_eq!(stream.available_to_read(), 1 + 2 + 4 + 8 + 8);
        assert_eq!(stream.read_u8().unwrap(), 0xAB);
        assert_eq!(stream.read_u16().unwrap(), 0xBEEF);
        assert_eq!(stream.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(stream.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(stream.read_f64().unwrap(), -1.5);
        assert_eq!(stream.available_to_read(), 0);
    }

    #[test]
    fn test_multibyte_values_are_little_endian() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_u32(0x0403_0201).unwrap();
        assert_eq!(stream.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_insufficient_data_leaves_cursor() {
        let bytes = [1u8, 2, 3];
        let mut stream = ByteStream::wrap(&bytes);
        stream.read_u8().unwrap();

        let before = stream.available_to_read();
        let err = stream.read_bytes(5).unwrap_err();
        assert_eq!(err, StreamError::InsufficientData { needed: 3 });
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.available_to_read(), before);
    }

    #[test]
    fn test_read_in_write_mode_fails() {
        let mut stream = ByteStream::allocate(16).unwrap();
        stream.write_u8(1).unwrap();
        assert!(matches!(
            stream.read_u8(),
            Err(StreamError::WrongMode { .. })
        ));
        assert_eq!(stream.available_to_read(), 0);
    }

    #[test]
    fn test_mode_switch_guards() {
        let mut stream = ByteStream::allocate(16).unwrap();
        assert!(stream.enter_write_mode().is_err());
        assert!(stream.mark().is_err());
        stream.enter_read_mode().unwrap();
        assert!(stream.enter_read_mode().is_err());
    }

    #[test]
    fn test_enter_write_mode_compacts_unread_tail() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_bytes(b"abcdef").unwrap();
        stream.enter_read_mode().unwrap();
        assert_eq!(stream.read_bytes(4).unwrap(), b"abcd");

        stream.enter_write_mode().unwrap();
        assert_eq!(stream.position(), 2);
        stream.write_bytes(b"gh").unwrap();

        stream.enter_read_mode().unwrap();
        assert_eq!(stream.remaining(), b"efgh");
    }

    #[test]
    fn test_enter_write_mode_appends_when_nothing_read() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_bytes(b"abc").unwrap();
        stream.enter_read_mode().unwrap();
        stream.enter_write_mode().unwrap();
        assert_eq!(stream.position(), 3);
        stream.write_bytes(b"d").unwrap();
        stream.enter_read_mode().unwrap();
        assert_eq!(stream.remaining(), b"abcd");
    }

    #[test]
    fn test_enter_write_mode_after_full_consume() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_bytes(b"abc").unwrap();
        stream.enter_read_mode().unwrap();
        stream.skip(3).unwrap();
        stream.enter_write_mode().unwrap();
        assert_eq!(stream.position(), 3);
        stream.write_bytes(b"xy").unwrap();
        stream.enter_read_mode().unwrap();
        assert_eq!(stream.remaining(), b"abcxy");
    }

    #[test]
    fn test_clear_before_write_mode_starts_at_zero() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_bytes(b"abc").unwrap();
        stream.enter_read_mode().unwrap();
        stream.skip(3).unwrap();
        stream.clear();
        assert_eq!(stream.available_to_read(), 0);
        stream.enter_write_mode().unwrap();
        assert_eq!(stream.position(), 0);
        stream.write_bytes(b"xy").unwrap();
        stream.enter_read_mode().unwrap();
        assert_eq!(stream.remaining(), b"xy");
    }

    #[test]
    fn test_mark_reset() {
        let bytes = [10u8, 20, 30, 40];
        let mut stream = ByteStream::wrap(&bytes);
        stream.read_u8().unwrap();
        stream.mark().unwrap();
        stream.read_u16().unwrap();
        stream.reset().unwrap();
        assert_eq!(stream.read_u8().unwrap(), 20);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut stream = ByteStream::allocate(512).unwrap();
        stream.write_bytes(&[7; 100]).unwrap();
        stream.clear();
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.capacity(), 512);
        assert!(stream.as_bytes().is_empty());
    }

    #[test]
    fn test_borrowed_never_grows() {
        let bytes = [1u8, 2];
        let mut stream = ByteStream::wrap(&bytes);
        assert!(stream.is_borrowed());
        assert_eq!(
            stream.write_u8(3),
            Err(StreamError::Borrowed { requested: 1 })
        );
        assert_eq!(stream.capacity(), 2);
    }

    #[test]
    fn test_wrap_mut_writes_within_bounds() {
        let mut backing = [0u8; 4];
        {
            let mut stream = ByteStream::wrap_mut(&mut backing);
            stream.write_u16(0x0201).unwrap();
            assert!(matches!(
                stream.write_u32(1),
                Err(StreamError::Borrowed { .. })
            ));
            assert_eq!(stream.position(), 2);
        }
        assert_eq!(backing, [1, 2, 0, 0]);
    }

    #[test]
    fn test_spare_and_advance() {
        let mut stream = ByteStream::allocate(0).unwrap();
        let spare = stream.spare_mut(300).unwrap();
        assert!(spare.len() >= 300);
        spare[..3].copy_from_slice(b"xyz");
        stream.advance(3).unwrap();
        stream.enter_read_mode().unwrap();
        assert_eq!(stream.remaining(), b"xyz");
    }

    #[test]
    fn test_advance_only_in_write_mode() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_u8(1).unwrap();
        stream.enter_read_mode().unwrap();
        assert!(matches!(
            stream.advance(10),
            Err(StreamError::WrongMode { expected: Mode::Writing, actual: Mode::Reading })
        ));
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.available_to_read(), 1);
    }

    #[test]
    fn test_patch_u32() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_u32(0).unwrap();
        stream.write_u8(9).unwrap();
        stream.patch_u32(0, 0x0403_0201).unwrap();
        assert_eq!(stream.as_bytes(), &[1, 2, 3, 4, 9]);
        assert!(matches!(
            stream.patch_u32(2, 7),
            Err(StreamError::InsufficientData { needed: 1 })
        ));
    }

    #[test]
    fn test_into_vec_truncates() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_bytes(b"hello").unwrap();
        assert_eq!(stream.into_vec(), b"hello".to_vec());
    }
}
