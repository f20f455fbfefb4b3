//! Dynamic Value Model
//!
//! Table disimpan di arena dan dirujuk lewat `TableId`, bukan pointer.
//! Dengan begitu graph siklik (table yang berisi dirinya sendiri) aman
//! dibangun, di-encode, dan di-decode tanpa reference counting.

use std::collections::HashMap;

/// Batas atas (eksklusif) untuk number yang di-encode sebagai U30
pub const U30_LIMIT: f64 = 4_294_967_296.0;

/// Handle ke table di dalam [`TableArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u32);

impl TableId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identitas opaque untuk function value. Tidak pernah di-serialize sebagai
/// kode; hanya bisa dikirim lewat [`SymbolTable`](super::SymbolTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(Vec<u8>),
    Table(TableId),
    Function(FunctionId),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<TableId> {
        match self {
            Value::Table(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub(crate) fn key(&self) -> Key {
        match self {
            Value::Nil => Key::Nil,
            Value::Bool(b) => Key::Bool(*b),
            // -0.0 dan 0.0 adalah key yang sama
            Value::Number(n) if *n == 0.0 => Key::Number(0),
            Value::Number(n) => Key::Number(n.to_bits()),
            Value::String(bytes) => Key::String(bytes.clone()),
            Value::Table(id) => Key::Table(*id),
            Value::Function(id) => Key::Function(*id),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::String(v)
    }
}

impl From<TableId> for Value {
    fn from(v: TableId) -> Self {
        Value::Table(v)
    }
}

impl From<FunctionId> for Value {
    fn from(v: FunctionId) -> Self {
        Value::Function(v)
    }
}

/// Bentuk hashable dari key table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Key {
    Nil,
    Bool(bool),
    Number(u64),
    String(Vec<u8>),
    Table(TableId),
    Function(FunctionId),
}

/// Klasifikasi number untuk pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumberClass {
    /// Integer non-negatif `< 2^32`
    U30(u32),
    /// Sisanya, di-pool berdasarkan bit pattern
    Double(u64),
}

#[inline]
pub(crate) fn classify(n: f64) -> NumberClass {
    if n >= 0.0 && n < U30_LIMIT && n.fract() == 0.0 {
        NumberClass::U30(n as u32)
    } else {
        NumberClass::Double(n.to_bits())
    }
}

/// Ordered key/value pairs. Set ke key yang sudah ada mengganti value di
/// tempat, urutan entry tidak berubah.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<(Value, Value)>,
    slots: HashMap<Key, usize>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set `key = value`, mengembalikan value lama kalau ada
    pub fn set(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.slots.get(&key.key()) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot].1, value)),
            None => {
                self.slots.insert(key.key(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Append ke array part (key = `array_len() + 1`)
    pub fn push(&mut self, value: impl Into<Value>) {
        let next = self.array_len() + 1;
        self.set(Value::Number(next as f64), value);
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.slots
            .get(&key.key())
            .map(|&slot| &self.entries[slot].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Panjang array part: N terbesar dengan key 1..N semuanya ada
    pub fn array_len(&self) -> usize {
        let mut n = 0usize;
        while self
            .slots
            .contains_key(&Key::Number(((n + 1) as f64).to_bits()))
        {
            n += 1;
        }
        n
    }
}

/// Pemilik semua table dalam satu graph
#[derive(Debug, Clone, Default)]
pub struct TableArena {
    tables: Vec<Table>,
}

impl TableArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table kosong baru
    pub fn alloc(&mut self) -> TableId {
        self.insert(Table::new())
    }

    pub fn insert(&mut self, table: Table) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(table);
        id
    }

    #[inline]
    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Satu graph lengkap: arena + root value. Unit yang di-encode dan
/// dikembalikan decoder.
#[derive(Debug, Clone)]
pub struct Document {
    pub arena: TableArena,
    pub root: Value,
}

impl Document {
    pub fn new(arena: TableArena, root: Value) -> Self {
        Self { arena, root }
    }

    /// Document tanpa table
    pub fn scalar(root: impl Into<Value>) -> Self {
        Self {
            arena: TableArena::new(),
            root: root.into(),
        }
    }

    /// Table root, kalau root memang table
    pub fn root_table(&self) -> Option<&Table> {
        self.root.as_table().and_then(|id| self.arena.get(id))
    }

    /// Kesamaan struktural: identitas table boleh berbeda dan urutan entry
    /// per table diabaikan, tapi bentuk graph (termasuk siklus dan sharing)
    /// harus sama.
    pub fn structurally_eq(&self, other: &Document) -> bool {
        let mut cmp = GraphComparison {
            left: &self.arena,
            right: &other.arena,
            forward: HashMap::new(),
            backward: HashMap::new(),
        };
        cmp.values(&self.root, &other.root)
    }
}

struct GraphComparison<'a> {
    left: &'a TableArena,
    right: &'a TableArena,
    forward: HashMap<TableId, TableId>,
    backward: HashMap<TableId, TableId>,
}

impl GraphComparison<'_> {
    fn values(&mut self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Table(x), Value::Table(y)) => self.tables(*x, *y),
            (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
            _ => a == b,
        }
    }

    fn tables(&mut self, x: TableId, y: TableId) -> bool {
        if let Some(&mapped) = self.forward.get(&x) {
            return mapped == y;
        }
        if self.backward.contains_key(&y) {
            return false;
        }
        // Asumsi optimistis supaya siklus berhenti
        self.forward.insert(x, y);
        self.backward.insert(y, x);

        let (Some(left), Some(right)) = (self.left.get(x), self.right.get(y)) else {
            return false;
        };
        if left.len() != right.len() {
            return false;
        }

        for (key, value) in left.iter() {
            let matched = match key {
                Value::Table(_) => self.match_table_key(key, value, right),
                _ => match right.get(key) {
                    Some(other) => self.values(value, other),
                    None => false,
                },
            };
            if !matched {
                return false;
            }
        }
        true
    }

    fn match_table_key(&mut self, key: &Value, value: &Value, right: &Table) -> bool {
        for (other_key, other_value) in right.iter() {
            if !matches!(other_key, Value::Table(_)) {
                continue;
            }
            let snapshot = (self.forward.clone(), self.backward.clone());
            if self.values(key, other_key) && self.values(value, other_value) {
                return true;
            }
            (self.forward, self.backward) = snapshot;
        }
        false
    }
}
