//! Tablewire - Compact Binary Object-Graph Codec
//!
//! Arsitektur:
//! - `core`: ByteStream dua mode (Writing / Reading) + varint U30
//! - `protocol`: encoder / decoder untuk graph table yang boleh siklik,
//!   dengan deduplikasi value dan symbol table lintas message
//! - `network`: framing length-prefix di atas TCP non-blocking (mio)
//!
//! ```
//! use tablewire::protocol::{decode, encode, Document, Table, TableArena, Value};
//!
//! let mut arena = TableArena::new();
//! let mut person = Table::new();
//! person.set("name", "alice");
//! person.set("age", 30);
//! let root = arena.insert(person);
//!
//! let doc = Document::new(arena, Value::Table(root));
//! let bytes = encode(&doc, None).unwrap();
//! let back = decode(&bytes, None).unwrap();
//! assert!(doc.structurally_eq(&back));
//! ```

pub mod core;
pub mod network;
pub mod protocol;

pub use crate::core::{ByteStream, Mode, StreamError};
pub use crate::protocol::{
    decode, decode_and_learn, decode_stream, encode, encode_value, DecodeError, Document,
    EncodeError, SymbolTable, Table, TableArena, TableId, Value,
};
