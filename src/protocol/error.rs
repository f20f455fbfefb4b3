//! Codec error types

use thiserror::Error;

use super::value::{FunctionId, TableId};
use crate::core::StreamError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Buffer gagal tumbuh atau ditulis
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Function hanya bisa dirujuk lewat symbol table
    #[error("function {0:?} is not registered in the symbol table")]
    UnresolvedFunction(FunctionId),

    #[error("a function value cannot be the root of a message")]
    FunctionRoot,

    #[error("table {0:?} does not exist in the arena")]
    DanglingTable(TableId),

    #[error("value was not registered during the graph walk")]
    Unpooled,

    #[error("length {0} does not fit in a U30 field")]
    LengthOverflow(usize),

    #[error("index space exhausted")]
    IndexOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Recoverable: tambahkan bytes lalu ulangi decode dari awal
    #[error("insufficient data: {needed} more byte(s) required")]
    InsufficientData { needed: usize },

    #[error("unexpected end of message at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("reference {index} resolves to no known value")]
    UnresolvedReference { index: u32 },

    #[error("table {table} declares {declared} byte(s) but its body spans {consumed}")]
    MalformedTable {
        table: u32,
        declared: usize,
        consumed: usize,
    },

    #[error("unsupported flag byte {0:#04x}")]
    UnsupportedFlags(u8),

    #[error("message assigns no value")]
    EmptyMessage,

    #[error("{remaining} trailing byte(s) after message")]
    TrailingData { remaining: usize },

    #[error("index space exhausted")]
    IndexOverflow,

    #[error("stream error: {0}")]
    Stream(StreamError),
}

impl DecodeError {
    /// Hanya `InsufficientData` yang layak di-retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, DecodeError::InsufficientData { .. })
    }
}
