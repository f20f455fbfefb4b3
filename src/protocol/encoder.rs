//! Object Graph Encoder
//!
//! Tiga tahap per panggilan:
//! 1. Pack: jalan ke seluruh graph, isi pool (table didaftarkan sebelum
//!    anak-anaknya, jadi siklus berhenti sendiri)
//! 2. Assign: bagikan global index, value yang sudah ada di symbol table
//!    memakai index lamanya dan tidak ikut dikirim
//! 3. Emit: flag byte, section sesuai urutan, lalu body tiap table

use super::error::EncodeError;
use super::message::{SectionFlags, MSG_FALSE, MSG_NIL, MSG_TRUE, REF_FALSE, REF_NIL, REF_TRUE};
use super::pool::Pool;
use super::symbols::{Symbol, SymbolTable};
use super::value::{classify, Document, FunctionId, NumberClass, TableArena, TableId, Value};
use crate::core::ByteStream;

/// Encode satu document ke buffer baru
pub fn encode(doc: &Document, symbols: Option<&mut SymbolTable>) -> Result<Vec<u8>, EncodeError> {
    encode_value(&doc.arena, &doc.root, symbols)
}

/// Encode `root` yang table-nya tinggal di `arena`
pub fn encode_value(
    arena: &TableArena,
    root: &Value,
    symbols: Option<&mut SymbolTable>,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = ByteStream::allocate(0)?;
    ObjectEncoder::new(arena).encode_into(root, symbols, &mut out)?;
    Ok(out.into_vec())
}

/// Global index untuk satu entry pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Sudah ada di symbol table, tidak dikirim
    Symbol(u32),
    /// Dikirim di message ini
    Local(u32),
}

impl Slot {
    #[inline(always)]
    fn index(self) -> u32 {
        match self {
            Slot::Symbol(i) | Slot::Local(i) => i,
        }
    }

    #[inline(always)]
    fn is_local(self) -> bool {
        matches!(self, Slot::Local(_))
    }
}

/// Hasil tahap assign
#[derive(Debug, Default)]
struct IndexPlan {
    numbers: Vec<Slot>,
    integers: Vec<Slot>,
    strings: Vec<Slot>,
    /// Sejajar dengan urutan registrasi table
    tables: Vec<u32>,
    functions: Vec<u32>,
    last_index: u32,
}

impl IndexPlan {
    fn local_count(slots: &[Slot]) -> usize {
        slots.iter().filter(|s| s.is_local()).count()
    }
}

#[inline]
fn next_index(running: &mut u32) -> Result<u32, EncodeError> {
    *running = running.checked_add(1).ok_or(EncodeError::IndexOverflow)?;
    Ok(*running)
}

#[inline]
fn slot_at(slots: &[Slot], position: Option<u32>) -> Result<u32, EncodeError> {
    position
        .and_then(|p| slots.get(p as usize - 1))
        .map(|s| s.index())
        .ok_or(EncodeError::Unpooled)
}

#[inline]
fn u30_len(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::LengthOverflow(len))
}

/// Konteks encode per panggilan. Semua pool hidup hanya selama satu
/// `encode_into`.
pub struct ObjectEncoder<'a> {
    arena: &'a TableArena,
    numbers: Pool<u64>,
    integers: Pool<u32>,
    strings: Pool<Vec<u8>>,
    tables: Pool<TableId>,
    /// Dicatat tapi tidak pernah dikirim; function hanya resolve lewat
    /// symbol table
    functions: Pool<FunctionId>,
}

impl<'a> ObjectEncoder<'a> {
    pub fn new(arena: &'a TableArena) -> Self {
        Self {
            arena,
            numbers: Pool::new(),
            integers: Pool::new(),
            strings: Pool::new(),
            tables: Pool::new(),
            functions: Pool::new(),
        }
    }

    /// Tulis message untuk `root` di cursor `out`.
    ///
    /// Kalau `symbols` diberikan, value baru ikut didaftarkan dan running
    /// index-nya maju melewati semua index yang dibagikan message ini.
    pub fn encode_into(
        mut self,
        root: &Value,
        mut symbols: Option<&mut SymbolTable>,
        out: &mut ByteStream<'_>,
    ) -> Result<(), EncodeError> {
        match root {
            Value::Bool(false) => return Ok(out.write_u8(MSG_FALSE)?),
            Value::Bool(true) => return Ok(out.write_u8(MSG_TRUE)?),
            Value::Nil => return Ok(out.write_u8(MSG_NIL)?),
            Value::Function(_) => return Err(EncodeError::FunctionRoot),
            Value::Number(_) | Value::String(_) | Value::Table(_) => {}
        }

        self.pack(root)?;

        // Root scalar selalu dikirim: message harus membawa root-nya sendiri
        let force_local = !matches!(root, Value::Table(_));
        let plan = self.assign(symbols.as_deref(), force_local)?;

        self.emit(&plan, out)?;

        if let Some(table) = symbols.as_deref_mut() {
            self.record(&plan, table);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pack
    // ------------------------------------------------------------------

    fn pack(&mut self, root: &Value) -> Result<(), EncodeError> {
        let arena = self.arena;
        let mut pending: Vec<TableId> = Vec::new();
        self.visit(root, &mut pending);

        while let Some(id) = pending.pop() {
            let table = arena.get(id).ok_or(EncodeError::DanglingTable(id))?;
            for (key, value) in table.iter() {
                self.visit(key, &mut pending);
                self.visit(value, &mut pending);
            }
        }
        Ok(())
    }

    #[inline]
    fn visit(&mut self, value: &Value, pending: &mut Vec<TableId>) {
        match value {
            Value::Nil | Value::Bool(_) => {}
            Value::Number(n) => match classify(*n) {
                NumberClass::U30(u) => {
                    self.integers.insert(u);
                }
                NumberClass::Double(bits) => {
                    self.numbers.insert(bits);
                }
            },
            Value::String(bytes) => {
                self.strings.insert_ref(bytes.as_slice());
            }
            Value::Table(id) => {
                // Daftar dulu, baru kunjungi isinya
                if self.tables.insert(*id).1 {
                    pending.push(*id);
                }
            }
            Value::Function(id) => {
                self.functions.insert(*id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Assign
    // ------------------------------------------------------------------

    fn assign(
        &self,
        symbols: Option<&SymbolTable>,
        force_local: bool,
    ) -> Result<IndexPlan, EncodeError> {
        let mut running = symbols.map_or(REF_TRUE, SymbolTable::last_index);
        let lookup = |symbol: Symbol| -> Option<u32> {
            if force_local {
                None
            } else {
                symbols.and_then(|t| t.lookup(&symbol))
            }
        };

        let mut plan = IndexPlan::default();

        for &bits in self.numbers.iter() {
            plan.numbers.push(match lookup(Symbol::Double(bits)) {
                Some(index) => Slot::Symbol(index),
                None => Slot::Local(next_index(&mut running)?),
            });
        }
        for &u in self.integers.iter() {
            plan.integers.push(match lookup(Symbol::Integer(u)) {
                Some(index) => Slot::Symbol(index),
                None => Slot::Local(next_index(&mut running)?),
            });
        }
        for bytes in self.strings.iter() {
            plan.strings.push(match lookup(Symbol::String(bytes.clone())) {
                Some(index) => Slot::Symbol(index),
                None => Slot::Local(next_index(&mut running)?),
            });
        }

        // Urutan terbalik: table root (registrasi pertama) dapat index terakhir
        plan.tables = vec![0; self.tables.len()];
        for slot in plan.tables.iter_mut().rev() {
            *slot = next_index(&mut running)?;
        }

        for &id in self.functions.iter() {
            let index = symbols
                .and_then(|t| t.lookup(&Symbol::Function(id)))
                .ok_or(EncodeError::UnresolvedFunction(id))?;
            plan.functions.push(index);
        }

        plan.last_index = running;
        Ok(plan)
    }

    /// Global index untuk `value` sesuai plan
    fn reference(&self, plan: &IndexPlan, value: &Value) -> Result<u32, EncodeError> {
        match value {
            Value::Nil => Ok(REF_NIL),
            Value::Bool(false) => Ok(REF_FALSE),
            Value::Bool(true) => Ok(REF_TRUE),
            Value::Number(n) => match classify(*n) {
                NumberClass::U30(u) => slot_at(&plan.integers, self.integers.position(&u)),
                NumberClass::Double(bits) => slot_at(&plan.numbers, self.numbers.position(&bits)),
            },
            Value::String(bytes) => slot_at(&plan.strings, self.strings.position(bytes.as_slice())),
            Value::Table(id) => self
                .tables
                .position(id)
                .and_then(|p| plan.tables.get(p as usize - 1).copied())
                .ok_or(EncodeError::DanglingTable(*id)),
            Value::Function(id) => self
                .functions
                .position(id)
                .and_then(|p| plan.functions.get(p as usize - 1).copied())
                .ok_or(EncodeError::UnresolvedFunction(*id)),
        }
    }

    // ------------------------------------------------------------------
    // Emit
    // ------------------------------------------------------------------

    fn emit(&self, plan: &IndexPlan, out: &mut ByteStream<'_>) -> Result<(), EncodeError> {
        let number_count = IndexPlan::local_count(&plan.numbers);
        let integer_count = IndexPlan::local_count(&plan.integers);
        let string_count = IndexPlan::local_count(&plan.strings);
        let table_count = plan.tables.len();

        let mut flags = SectionFlags::empty();
        flags.set_if(SectionFlags::NUMBERS, number_count > 0);
        flags.set_if(SectionFlags::INTEGERS, integer_count > 0);
        flags.set_if(SectionFlags::STRINGS, string_count > 0);
        flags.set_if(SectionFlags::TABLES, table_count > 0);
        out.write_u8(flags.bits())?;

        if number_count > 0 {
            out.write_u30(u30_len(number_count)?)?;
            for (&bits, slot) in self.numbers.iter().zip(&plan.numbers) {
                if slot.is_local() {
                    out.write_f64(f64::from_bits(bits))?;
                }
            }
        }

        if integer_count > 0 {
            out.write_u30(u30_len(integer_count)?)?;
            for (&u, slot) in self.integers.iter().zip(&plan.integers) {
                if slot.is_local() {
                    out.write_u30(u)?;
                }
            }
        }

        if string_count > 0 {
            out.write_u30(u30_len(string_count)?)?;
            for (bytes, slot) in self.strings.iter().zip(&plan.strings) {
                if slot.is_local() {
                    out.write_u30(u30_len(bytes.len())?)?;
                    out.write_bytes(bytes)?;
                }
            }
        }

        if table_count > 0 {
            out.write_u30(u30_len(table_count)?)?;

            // Body ditulis sesuai urutan index (kebalikan urutan registrasi)
            let mut body = ByteStream::allocate(0)?;
            for position in (1..=table_count as u32).rev() {
                let id = *self.tables.get(position).ok_or(EncodeError::Unpooled)?;
                body.clear();
                self.write_table_body(plan, id, &mut body)?;
                let bytes = body.as_bytes();
                out.write_u30(u30_len(bytes.len())?)?;
                out.write_bytes(bytes)?;
            }
        }

        Ok(())
    }

    fn write_table_body(
        &self,
        plan: &IndexPlan,
        id: TableId,
        body: &mut ByteStream<'_>,
    ) -> Result<(), EncodeError> {
        let table = self.arena.get(id).ok_or(EncodeError::DanglingTable(id))?;
        let array_len = table.array_len();
        body.write_u30(u30_len(array_len)?)?;

        for k in 1..=array_len {
            let value = table
                .get(&Value::Number(k as f64))
                .ok_or(EncodeError::Unpooled)?;
            body.write_u30(self.reference(plan, value)?)?;
        }

        for (key, value) in table.iter() {
            if in_array_part(key, array_len) {
                continue;
            }
            body.write_u30(self.reference(plan, key)?)?;
            body.write_u30(self.reference(plan, value)?)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Symbol table update
    // ------------------------------------------------------------------

    fn record(&self, plan: &IndexPlan, table: &mut SymbolTable) {
        for (&bits, slot) in self.numbers.iter().zip(&plan.numbers) {
            if let Slot::Local(index) = slot {
                table.learn(Symbol::Double(bits), *index);
            }
        }
        for (&u, slot) in self.integers.iter().zip(&plan.integers) {
            if let Slot::Local(index) = slot {
                table.learn(Symbol::Integer(u), *index);
            }
        }
        for (bytes, slot) in self.strings.iter().zip(&plan.strings) {
            if let Slot::Local(index) = slot {
                table.learn(Symbol::String(bytes.clone()), *index);
            }
        }
        table.advance_to(plan.last_index);
    }
}

/// Key integer di `[1, array_len]` sudah dikirim lewat array part
#[inline]
fn in_array_part(key: &Value, array_len: usize) -> bool {
    match key {
        Value::Number(n) => *n >= 1.0 && *n <= array_len as f64 && n.fract() == 0.0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::value::Table;

    #[test]
    fn test_bool_fast_path() {
        assert_eq!(encode(&Document::scalar(true), None).unwrap(), vec![0x01]);
        assert_eq!(encode(&Document::scalar(false), None).unwrap(), vec![0x00]);
        assert_eq!(encode(&Document::scalar(Value::Nil), None).unwrap(), vec![0x02]);
    }

    #[test]
    fn test_integer_300() {
        let bytes = encode(&Document::scalar(300), None).unwrap();
        // flag, count 1, varint 300
        assert_eq!(bytes, vec![SectionFlags::INTEGERS, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_double_section() {
        let bytes = encode(&Document::scalar(-2.5), None).unwrap();
        assert_eq!(bytes[0], SectionFlags::NUMBERS);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[2..], &(-2.5f64).to_le_bytes());
    }

    #[test]
    fn test_string_dedup() {
        let mut arena = TableArena::new();
        let mut table = Table::new();
        table.push("dup");
        table.push("dup");
        let root = arena.insert(table);

        let bytes = encode_value(&arena, &Value::Table(root), None).unwrap();
        assert_eq!(
            bytes[0],
            SectionFlags::INTEGERS | SectionFlags::STRINGS | SectionFlags::TABLES
        );
        let mut stream = ByteStream::wrap(&bytes);
        stream.skip(1).unwrap();
        // Key array part (1, 2) tetap di-pool sebagai integer
        assert_eq!(stream.read_u30().unwrap(), 2);
        stream.read_u30().unwrap();
        stream.read_u30().unwrap();
        // strings section: satu entry
        assert_eq!(stream.read_u30().unwrap(), 1);
    }

    #[test]
    fn test_self_cycle_terminates() {
        let mut arena = TableArena::new();
        let root = arena.alloc();
        arena.get_mut(root).unwrap().set("me", root);
        let bytes = encode_value(&arena, &Value::Table(root), None).unwrap();
        assert_eq!(bytes[0], SectionFlags::STRINGS | SectionFlags::TABLES);
    }

    #[test]
    fn test_root_table_gets_last_index() {
        let mut arena = TableArena::new();
        let root = arena.alloc();
        let child = arena.alloc();
        arena.get_mut(root).unwrap().set("child", child);

        let encoder_arena = arena.clone();
        let mut encoder = ObjectEncoder::new(&encoder_arena);
        encoder.pack(&Value::Table(root)).unwrap();
        let plan = encoder.assign(None, false).unwrap();
        // "child" = 3, child table = 4, root = 5
        assert_eq!(plan.strings, vec![Slot::Local(3)]);
        assert_eq!(plan.tables, vec![5, 4]);
        assert_eq!(plan.last_index, 5);
    }

    #[test]
    fn test_function_requires_symbol() {
        let mut arena = TableArena::new();
        let root = arena.alloc();
        arena
            .get_mut(root)
            .unwrap()
            .set("f", Value::Function(FunctionId(7)));

        let err = encode_value(&arena, &Value::Table(root), None).unwrap_err();
        assert_eq!(err, EncodeError::UnresolvedFunction(FunctionId(7)));

        let mut symbols = SymbolTable::new();
        symbols.register(&Value::Function(FunctionId(7)));
        let bytes = encode_value(&arena, &Value::Table(root), Some(&mut symbols)).unwrap();
        assert_eq!(bytes[0] & SectionFlags::FUNCTIONS, 0);
    }

    #[test]
    fn test_function_root_rejected() {
        let doc = Document::scalar(Value::Function(FunctionId(1)));
        assert_eq!(encode(&doc, None), Err(EncodeError::FunctionRoot));
    }

    #[test]
    fn test_dangling_table() {
        let mut other = TableArena::new();
        let id = other.alloc();
        let empty = TableArena::new();
        assert_eq!(
            encode_value(&empty, &Value::Table(id), None),
            Err(EncodeError::DanglingTable(id))
        );
    }

    #[test]
    fn test_symbols_advance_past_tables() {
        let mut arena = TableArena::new();
        let root = arena.alloc();
        arena.get_mut(root).unwrap().set("k", "v");

        let mut symbols = SymbolTable::new();
        encode_value(&arena, &Value::Table(root), Some(&mut symbols)).unwrap();
        // "k" = 3, "v" = 4, root table = 5
        assert_eq!(symbols.last_index(), 5);
        assert_eq!(symbols.index_of(&"v".into()), Some(4));
        assert_eq!(symbols.len(), 2);
    }
}
