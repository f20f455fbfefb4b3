//! Cross-Message Symbol Table
//!
//! Dictionary value ↔ global index milik caller. Value yang sudah ada di sini
//! tidak dikirim ulang; message cukup merujuk index-nya.
//!
//! Kedua sisi (encoder dan decoder) harus menerapkan event penambahan index
//! dengan urutan yang sama. Tidak ada sinkronisasi internal: kalau dipakai
//! bersama oleh banyak thread, caller yang men-serialize akses.

use std::collections::HashMap;

use super::message::REF_TRUE;
use super::value::{classify, FunctionId, NumberClass, Value};

/// Value yang boleh masuk symbol table. Table tidak termasuk: identitas
/// table hanya berlaku di dalam satu message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Double(u64),
    Integer(u32),
    String(Vec<u8>),
    Function(FunctionId),
}

impl Symbol {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(match classify(*n) {
                NumberClass::U30(u) => Symbol::Integer(u),
                NumberClass::Double(bits) => Symbol::Double(bits),
            }),
            Value::String(bytes) => Some(Symbol::String(bytes.clone())),
            Value::Function(id) => Some(Symbol::Function(*id)),
            Value::Nil | Value::Bool(_) | Value::Table(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Symbol::Double(bits) => Value::Number(f64::from_bits(*bits)),
            Symbol::Integer(u) => Value::Number(f64::from(*u)),
            Symbol::String(bytes) => Value::String(bytes.clone()),
            Symbol::Function(id) => Value::Function(*id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    by_symbol: HashMap<Symbol, u32>,
    by_index: HashMap<u32, Symbol>,
    /// Index terakhir yang sudah dibagikan. Mulai dari 2 (1/2 = false/true)
    last_index: u32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            by_symbol: HashMap::new(),
            by_index: HashMap::new(),
            last_index: REF_TRUE,
        }
    }

    /// Table yang sudah berisi `values` dengan urutan index sesuai iterasi.
    /// Kedua peer harus membangunnya dari daftar yang sama.
    pub fn with_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut table = Self::new();
        for value in values {
            table.register(&value.into());
        }
        table
    }

    /// Running index: message berikutnya mulai membagikan `last_index() + 1`
    #[inline]
    pub fn last_index(&self) -> u32 {
        self.last_index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    /// Daftarkan value (idempotent). `None` untuk nil, bool, dan table, atau
    /// kalau ruang index habis.
    pub fn register(&mut self, value: &Value) -> Option<u32> {
        let symbol = Symbol::from_value(value)?;
        if let Some(&index) = self.by_symbol.get(&symbol) {
            return Some(index);
        }
        let index = self.last_index.checked_add(1)?;
        self.last_index = index;
        self.learn(symbol, index);
        Some(index)
    }

    pub fn index_of(&self, value: &Value) -> Option<u32> {
        Symbol::from_value(value).and_then(|symbol| self.lookup(&symbol))
    }

    pub fn value_at(&self, index: u32) -> Option<Value> {
        self.by_index.get(&index).map(Symbol::to_value)
    }

    #[inline]
    pub(crate) fn lookup(&self, symbol: &Symbol) -> Option<u32> {
        self.by_symbol.get(symbol).copied()
    }

    /// Catat `symbol` di `index` kalau symbol belum dikenal
    pub(crate) fn learn(&mut self, symbol: Symbol, index: u32) {
        if self.by_symbol.contains_key(&symbol) || self.by_index.contains_key(&index) {
            return;
        }
        self.by_index.insert(index, symbol.clone());
        self.by_symbol.insert(symbol, index);
    }

    pub(crate) fn advance_to(&mut self, last_index: u32) {
        self.last_index = self.last_index.max(last_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_table_starts_after_reserved() {
        let mut table = SymbolTable::new();
        assert_eq!(table.last_index(), 2);
        assert_eq!(table.register(&Value::from("hello")), Some(3));
        assert_eq!(table.register(&Value::from(1.5)), Some(4));
        assert_eq!(table.register(&Value::from("hello")), Some(3));
        assert_eq!(table.last_index(), 4);
    }

    #[test]
    fn test_lookup_both_directions() {
        let table = SymbolTable::with_values(["id", "name"]);
        assert_eq!(table.index_of(&"name".into()), Some(4));
        assert_eq!(table.value_at(3), Some(Value::from("id")));
        assert_eq!(table.value_at(9), None);
    }

    #[test]
    fn test_tables_and_bools_are_not_symbols() {
        let mut table = SymbolTable::new();
        assert_eq!(table.register(&Value::Bool(true)), None);
        assert_eq!(table.register(&Value::Nil), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_function_identity() {
        let mut table = SymbolTable::new();
        let index = table.register(&Value::Function(FunctionId(42))).unwrap();
        assert_eq!(table.value_at(index), Some(Value::Function(FunctionId(42))));
    }
}
