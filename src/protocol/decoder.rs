//! Object Graph Decoder
//!
//! Kebalikan dari encoder:
//! 1. Baca section scalar, setiap value dapat index berikutnya
//! 2. Pass 1: alokasikan placeholder kosong untuk semua table
//! 3. Pass 2: isi tiap table dari body-nya; reference ke table mana pun
//!    (termasuk dirinya sendiri atau sibling yang belum diisi) sudah valid

use super::error::DecodeError;
use super::message::{SectionFlags, MSG_FALSE, MSG_NIL, MSG_TRUE, REF_FALSE, REF_NIL, REF_TRUE};
use super::symbols::{Symbol, SymbolTable};
use super::value::{Document, TableArena, Value};
use crate::core::{ByteStream, StreamError};

/// Decode satu message yang menempati seluruh `bytes`
pub fn decode(bytes: &[u8], symbols: Option<&SymbolTable>) -> Result<Document, DecodeError> {
    decode_message(bytes, symbols).map(|msg| msg.document)
}

/// Decode lalu terapkan index baru ke `symbols`, sama persis dengan yang
/// dilakukan encoder di sisi pengirim
pub fn decode_and_learn(bytes: &[u8], symbols: &mut SymbolTable) -> Result<Document, DecodeError> {
    let msg = decode_message(bytes, Some(symbols))?;
    for (symbol, index) in msg.learned {
        symbols.learn(symbol, index);
    }
    symbols.advance_to(msg.last_index);
    Ok(msg.document)
}

/// Decode satu message dari cursor `stream`.
///
/// Kalau gagal (termasuk `InsufficientData`), cursor dikembalikan ke awal
/// message: tambahkan bytes lalu panggil lagi. Kalau sukses, cursor berada
/// tepat setelah message. `mark()` milik caller tidak disentuh.
pub fn decode_stream(
    stream: &mut ByteStream<'_>,
    symbols: Option<&SymbolTable>,
) -> Result<Document, DecodeError> {
    let start = stream.position();
    match ObjectDecoder::new(symbols).read_message(stream) {
        Ok(msg) => Ok(msg.document),
        Err(err) => {
            stream.rewind_to(start);
            Err(err)
        }
    }
}

fn decode_message(
    bytes: &[u8],
    symbols: Option<&SymbolTable>,
) -> Result<DecodedMessage, DecodeError> {
    let mut stream = ByteStream::wrap(bytes);
    let msg = ObjectDecoder::new(symbols).read_message(&mut stream)?;
    match stream.available_to_read() {
        0 => Ok(msg),
        remaining => Err(DecodeError::TrailingData { remaining }),
    }
}

// Ukuran minimum satu item per section
const MIN_NUMBER_LEN: usize = 8;
const MIN_INTEGER_LEN: usize = 1;
/// Varint panjang string
const MIN_STRING_LEN: usize = 1;
/// Varint panjang body + array count
const MIN_TABLE_LEN: usize = 2;

struct DecodedMessage {
    document: Document,
    /// Scalar yang mendapat index baru, sesuai urutan section
    learned: Vec<(Symbol, u32)>,
    last_index: u32,
}

/// Truncation di luar pembacaan bytes mentah
#[inline]
fn truncated(err: StreamError, offset: usize) -> DecodeError {
    match err {
        StreamError::InsufficientData { .. } => DecodeError::UnexpectedEof { offset },
        other => DecodeError::Stream(other),
    }
}

/// Truncation saat membaca string / body table
#[inline]
fn short_read(err: StreamError) -> DecodeError {
    match err {
        StreamError::InsufficientData { needed } => DecodeError::InsufficientData { needed },
        other => DecodeError::Stream(other),
    }
}

pub struct ObjectDecoder<'s> {
    symbols: Option<&'s SymbolTable>,
}

impl<'s> ObjectDecoder<'s> {
    pub fn new(symbols: Option<&'s SymbolTable>) -> Self {
        Self { symbols }
    }

    fn read_u30(stream: &mut ByteStream<'_>) -> Result<u32, DecodeError> {
        stream.read_u30().map_err(|e| truncated(e, stream.position()))
    }

    /// Count section, dibatasi bytes yang tersisa: setiap item butuh minimal
    /// `min_item_len` bytes, jadi count yang lebih besar pasti terpotong
    fn read_count(stream: &mut ByteStream<'_>, min_item_len: usize) -> Result<u32, DecodeError> {
        let count = Self::read_u30(stream)?;
        if count as usize > stream.available_to_read() / min_item_len {
            return Err(DecodeError::UnexpectedEof {
                offset: stream.position(),
            });
        }
        Ok(count)
    }

    fn read_message(&self, stream: &mut ByteStream<'_>) -> Result<DecodedMessage, DecodeError> {
        let base_index = self.symbols.map_or(REF_TRUE, SymbolTable::last_index);

        let flag = stream
            .read_u8()
            .map_err(|e| truncated(e, stream.position()))?;
        let root = match flag {
            MSG_FALSE => Some(Value::Bool(false)),
            MSG_TRUE => Some(Value::Bool(true)),
            MSG_NIL => Some(Value::Nil),
            _ => None,
        };
        if let Some(root) = root {
            return Ok(DecodedMessage {
                document: Document::scalar(root),
                learned: Vec::new(),
                last_index: base_index,
            });
        }

        let flags = SectionFlags::from_u8(flag).ok_or(DecodeError::UnsupportedFlags(flag))?;

        let mut locals: Vec<Value> = Vec::new();
        let mut learned: Vec<(Symbol, u32)> = Vec::new();
        let mut arena = TableArena::new();

        let mut bind = |value: Value,
                        symbol: Option<Symbol>,
                        locals: &mut Vec<Value>|
         -> Result<(), DecodeError> {
            locals.push(value);
            let index = base_index
                .checked_add(locals.len() as u32)
                .ok_or(DecodeError::IndexOverflow)?;
            if let Some(symbol) = symbol {
                learned.push((symbol, index));
            }
            Ok(())
        };

        if flags.contains(SectionFlags::NUMBERS) {
            let count = Self::read_count(stream, MIN_NUMBER_LEN)?;
            for _ in 0..count {
                let n = stream
                    .read_f64()
                    .map_err(|e| truncated(e, stream.position()))?;
                bind(Value::Number(n), Some(Symbol::Double(n.to_bits())), &mut locals)?;
            }
        }

        if flags.contains(SectionFlags::INTEGERS) {
            let count = Self::read_count(stream, MIN_INTEGER_LEN)?;
            for _ in 0..count {
                let u = Self::read_u30(stream)?;
                bind(Value::Number(f64::from(u)), Some(Symbol::Integer(u)), &mut locals)?;
            }
        }

        if flags.contains(SectionFlags::STRINGS) {
            let count = Self::read_count(stream, MIN_STRING_LEN)?;
            for _ in 0..count {
                let len = Self::read_u30(stream)? as usize;
                let bytes = stream.read_bytes(len).map_err(short_read)?.to_vec();
                let symbol = Symbol::String(bytes.clone());
                bind(Value::String(bytes), Some(symbol), &mut locals)?;
            }
        }

        let mut placeholders = Vec::new();
        if flags.contains(SectionFlags::TABLES) {
            // Pass 1: placeholder kosong, sudah bisa dirujuk
            let count = Self::read_count(stream, MIN_TABLE_LEN)?;
            for _ in 0..count {
                let id = arena.alloc();
                placeholders.push(id);
                bind(Value::Table(id), None, &mut locals)?;
            }
        }

        // Pass 2: isi table
        for (n, &id) in placeholders.iter().enumerate() {
            let declared = Self::read_u30(stream)? as usize;
            let body = stream.read_bytes(declared).map_err(short_read)?;
            let table_index = base_index + (locals.len() - placeholders.len() + n + 1) as u32;
            // Body berhenti di tengah varint: isi melewati panjang yang diklaim
            let overrun = move |_: StreamError| DecodeError::MalformedTable {
                table: table_index,
                declared,
                consumed: declared + 1,
            };

            let mut body = ByteStream::wrap(body);
            let mut entries: Vec<(Value, Value)> = Vec::new();

            let array_len = body.read_u30().map_err(overrun)?;
            for k in 1..=array_len {
                let index = body.read_u30().map_err(overrun)?;
                entries.push((Value::Number(f64::from(k)), self.resolve(index, base_index, &locals)?));
            }
            while body.available_to_read() > 0 {
                let key = body.read_u30().map_err(overrun)?;
                let value = body.read_u30().map_err(overrun)?;
                entries.push((
                    self.resolve(key, base_index, &locals)?,
                    self.resolve(value, base_index, &locals)?,
                ));
            }

            let table = arena.get_mut(id).ok_or(DecodeError::UnresolvedReference {
                index: table_index,
            })?;
            for (key, value) in entries {
                table.set(key, value);
            }
        }

        let root = locals.pop().ok_or(DecodeError::EmptyMessage)?;
        let last_index = base_index + locals.len() as u32 + 1;

        Ok(DecodedMessage {
            document: Document::new(arena, root),
            learned,
            last_index,
        })
    }

    /// Symbol table dulu, lalu value lokal message ini
    fn resolve(&self, index: u32, base_index: u32, locals: &[Value]) -> Result<Value, DecodeError> {
        match index {
            REF_NIL => return Ok(Value::Nil),
            REF_FALSE => return Ok(Value::Bool(false)),
            REF_TRUE => return Ok(Value::Bool(true)),
            _ => {}
        }
        if let Some(value) = self.symbols.and_then(|t| t.value_at(index)) {
            return Ok(value);
        }
        index
            .checked_sub(base_index + 1)
            .and_then(|i| locals.get(i as usize))
            .cloned()
            .ok_or(DecodeError::UnresolvedReference { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoder::{encode, encode_value};
    use crate::protocol::value::Table;

    #[test]
    fn test_fast_paths() {
        assert_eq!(decode(&[0x01], None).unwrap().root, Value::Bool(true));
        assert_eq!(decode(&[0x00], None).unwrap().root, Value::Bool(false));
        assert_eq!(decode(&[0x02], None).unwrap().root, Value::Nil);
    }

    #[test]
    fn test_decode_300() {
        let bytes = [SectionFlags::INTEGERS, 0x01, 0xAC, 0x02];
        assert_eq!(decode(&bytes, None).unwrap().root, Value::Number(300.0));
    }

    #[test]
    fn test_self_reference_points_to_itself() {
        let mut arena = TableArena::new();
        let root = arena.alloc();
        arena.get_mut(root).unwrap().set("me", root);
        let bytes = encode_value(&arena, &Value::Table(root), None).unwrap();

        let doc = decode(&bytes, None).unwrap();
        let id = doc.root.as_table().unwrap();
        let table = doc.arena.get(id).unwrap();
        assert_eq!(table.get(&"me".into()), Some(&Value::Table(id)));
    }

    #[test]
    fn test_shared_subtable_stays_shared() {
        let mut arena = TableArena::new();
        let shared = arena.alloc();
        arena.get_mut(shared).unwrap().set("x", 1);
        let mut root = Table::new();
        root.set("a", shared);
        root.set("b", shared);
        let root = arena.insert(root);

        let bytes = encode_value(&arena, &Value::Table(root), None).unwrap();
        let doc = decode(&bytes, None).unwrap();
        let table = doc.root_table().unwrap();
        assert_eq!(table.get(&"a".into()), table.get(&"b".into()));
        assert_eq!(doc.arena.len(), 2);
    }

    #[test]
    fn test_unresolved_reference() {
        // Satu table: array part 1 elemen yang merujuk index 99
        let bytes = [SectionFlags::TABLES, 0x01, 0x02, 0x01, 99];
        assert_eq!(
            decode(&bytes, None).unwrap_err(),
            DecodeError::UnresolvedReference { index: 99 }
        );
    }

    #[test]
    fn test_malformed_table_length() {
        // Body mengklaim 1 byte tapi array count 1 butuh ref setelahnya
        let bytes = [SectionFlags::TABLES, 0x01, 0x01, 0x01];
        assert!(matches!(
            decode(&bytes, None).unwrap_err(),
            DecodeError::MalformedTable { declared: 1, .. }
        ));
    }

    #[test]
    fn test_truncated_string_is_insufficient() {
        let bytes = [SectionFlags::STRINGS, 0x01, 0x05, b'a', b'b'];
        let err = decode(&bytes, None).unwrap_err();
        assert_eq!(err, DecodeError::InsufficientData { needed: 3 });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_truncated_count_is_eof() {
        let bytes = [SectionFlags::INTEGERS];
        assert_eq!(
            decode(&bytes, None).unwrap_err(),
            DecodeError::UnexpectedEof { offset: 1 }
        );
    }

    #[test]
    fn test_oversized_counts_rejected_before_allocation() {
        // Count tabel 0xFFFF_FFFF tanpa satu pun body
        let bytes = [SectionFlags::TABLES, 0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        assert_eq!(
            decode(&bytes, None).unwrap_err(),
            DecodeError::UnexpectedEof { offset: 6 }
        );

        // 2 double tapi hanya 8 byte
        let mut bytes = vec![SectionFlags::NUMBERS, 0x02];
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        assert_eq!(
            decode(&bytes, None).unwrap_err(),
            DecodeError::UnexpectedEof { offset: 2 }
        );

        let bytes = [SectionFlags::INTEGERS, 0x80, 0x80, 0x80, 0x01, 0x05];
        assert_eq!(
            decode(&bytes, None).unwrap_err(),
            DecodeError::UnexpectedEof { offset: 5 }
        );

        let bytes = [SectionFlags::STRINGS, 0x03, 0x00, 0x00];
        assert_eq!(
            decode(&bytes, None).unwrap_err(),
            DecodeError::UnexpectedEof { offset: 2 }
        );
    }

    #[test]
    fn test_unsupported_flags() {
        assert_eq!(
            decode(&[SectionFlags::FUNCTIONS], None).unwrap_err(),
            DecodeError::UnsupportedFlags(SectionFlags::FUNCTIONS)
        );
    }

    #[test]
    fn test_trailing_data() {
        assert_eq!(
            decode(&[0x01, 0x00], None).unwrap_err(),
            DecodeError::TrailingData { remaining: 1 }
        );
    }

    #[test]
    fn test_decode_stream_rewinds_then_succeeds() {
        let full = encode(&Document::scalar("streaming"), None).unwrap();

        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_bytes(&full[..4]).unwrap();
        stream.enter_read_mode().unwrap();

        let err = decode_stream(&mut stream, None).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(stream.position(), 0);

        stream.enter_write_mode().unwrap();
        stream.write_bytes(&full[4..]).unwrap();
        stream.write_u8(0x01).unwrap();
        stream.enter_read_mode().unwrap();

        let doc = decode_stream(&mut stream, None).unwrap();
        assert_eq!(doc.root, Value::from("streaming"));
        let next = decode_stream(&mut stream, None).unwrap();
        assert_eq!(next.root, Value::Bool(true));
        assert_eq!(stream.available_to_read(), 0);
    }

    #[test]
    fn test_decode_stream_keeps_caller_mark() {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_u8(0x01).unwrap();
        // Message kedua terpotong setelah count
        stream.write_bytes(&[SectionFlags::STRINGS, 0x01, 0x04]).unwrap();
        stream.enter_read_mode().unwrap();
        stream.mark().unwrap();

        assert_eq!(decode_stream(&mut stream, None).unwrap().root, Value::Bool(true));
        let err = decode_stream(&mut stream, None).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(stream.position(), 1);

        stream.reset().unwrap();
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_decode_and_learn_mirrors_encoder() {
        let mut arena = TableArena::new();
        let root = arena.alloc();
        arena.get_mut(root).unwrap().set("name", "alice");

        let mut sender = SymbolTable::new();
        let mut receiver = SymbolTable::new();

        let first = encode_value(&arena, &Value::Table(root), Some(&mut sender)).unwrap();
        decode_and_learn(&first, &mut receiver).unwrap();
        assert_eq!(sender.last_index(), receiver.last_index());
        assert_eq!(receiver.index_of(&"alice".into()), sender.index_of(&"alice".into()));

        let second = encode_value(&arena, &Value::Table(root), Some(&mut sender)).unwrap();
        assert!(second.len() < first.len());
        let doc = decode_and_learn(&second, &mut receiver).unwrap();
        assert_eq!(
            doc.root_table().unwrap().get(&"name".into()),
            Some(&Value::from("alice"))
        );
        assert_eq!(sender.last_index(), receiver.last_index());
    }
}
