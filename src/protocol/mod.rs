//! Protocol Layer: Object Graph Codec
//!
//! Prinsip desain:
//! - Deduplikasi: setiap scalar dikirim sekali, sisanya cukup reference
//! - Graph, bukan tree: shared subtable dan siklus tetap utuh
//! - Symbol table opsional: value yang sudah disepakati kedua peer tidak
//!   perlu dikirim ulang di message berikutnya
//! - Tidak ada unsafe: table dirujuk lewat `TableId` di arena

mod decoder;
mod encoder;
mod error;
mod message;
mod pool;
mod symbols;
mod value;

pub use decoder::{decode, decode_and_learn, decode_stream, ObjectDecoder};
pub use encoder::{encode, encode_value, ObjectEncoder};
pub use error::{DecodeError, EncodeError};
pub use message::{
    SectionFlags, MSG_FALSE, MSG_NIL, MSG_TRUE, REF_FALSE, REF_NIL, REF_TRUE,
};
pub use pool::Pool;
pub use symbols::{Symbol, SymbolTable};
pub use value::{Document, FunctionId, Table, TableArena, TableId, Value, U30_LIMIT};
