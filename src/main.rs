//! Tablewire - Compact Binary Object-Graph Codec
//!
//! Micro-benchmark cepat tanpa criterion:
//! - ByteStream: write / read primitive + varint
//! - Codec: encode / decode document bersarang
//! - Symbol table: ukuran dan latency message berulang
//!
//! Untuk angka yang stabil pakai `cargo bench`.

use std::error::Error;
use std::hint::black_box;
use std::time::Instant;

use tablewire::core::ByteStream;
use tablewire::protocol::{
    decode, decode_and_learn, encode, Document, SymbolTable, Table, TableArena, Value,
};

fn main() -> Result<(), Box<dyn Error>> {
    println!("🚀 Tablewire Codec - micro benchmark");
    println!("====================================\n");

    benchmark_byte_stream()?;
    benchmark_codec()?;
    benchmark_symbol_table()?;

    println!("\n✅ All benchmarks complete!");
    println!("\nTo start server: cargo run --release --bin tablewire_server");
    Ok(())
}

/// Record dengan array part, hash part, dan satu subtable yang dipakai dua kali
fn sample_document(rows: usize) -> Document {
    let mut arena = TableArena::new();

    let mut currency = Table::new();
    currency.set("code", "IDR");
    currency.set("scale", 2);
    let currency = arena.insert(currency);

    let mut list = Table::new();
    for i in 0..rows {
        let mut row = Table::new();
        row.set("id", i as u32);
        row.set("amount", i as f64 * 1.5);
        row.set("label", format!("row-{}", i % 16));
        row.set("currency", currency);
        list.push(arena.insert(row));
    }
    let list = arena.insert(list);

    let mut root = Table::new();
    root.set("rows", list);
    root.set("currency", currency);
    let root = arena.insert(root);
    Document::new(arena, Value::Table(root))
}

fn benchmark_byte_stream() -> Result<(), Box<dyn Error>> {
    println!("📊 ByteStream Benchmark (write → read)");
    println!("--------------------------------------");

    const ITERATIONS: usize = 1_000_000;

    let mut stream = ByteStream::allocate(0)?;
    let start = Instant::now();
    for i in 0..ITERATIONS {
        stream.write_u30(black_box(i as u32))?;
        stream.write_f64(black_box(i as f64))?;
    }
    let write_duration = start.elapsed();

    stream.enter_read_mode()?;
    let start = Instant::now();
    for _ in 0..ITERATIONS {
        black_box(stream.read_u30()?);
        black_box(stream.read_f64()?);
    }
    let read_duration = start.elapsed();

    let write_ns = write_duration.as_nanos() as f64 / ITERATIONS as f64;
    let read_ns = read_duration.as_nanos() as f64 / ITERATIONS as f64;

    println!("  Operations: {} (varint + f64 each)", ITERATIONS);
    println!("  Buffer capacity: {} bytes", stream.capacity());
    println!("  Write latency: {:.2} ns/op", write_ns);
    println!("  Read latency:  {:.2} ns/op\n", read_ns);
    Ok(())
}

fn benchmark_codec() -> Result<(), Box<dyn Error>> {
    println!("📊 Codec Benchmark (100-row document)");
    println!("-------------------------------------");

    const ITERATIONS: usize = 10_000;
    let doc = sample_document(100);

    let start = Instant::now();
    let mut bytes = Vec::new();
    for _ in 0..ITERATIONS {
        bytes = encode(black_box(&doc), None)?;
    }
    let encode_duration = start.elapsed();

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        black_box(decode(black_box(&bytes), None)?);
    }
    let decode_duration = start.elapsed();

    let encode_us = encode_duration.as_secs_f64() * 1e6 / ITERATIONS as f64;
    let decode_us = decode_duration.as_secs_f64() * 1e6 / ITERATIONS as f64;

    println!("  Message size: {} bytes", bytes.len());
    println!("  Encode latency: {:.2} μs/doc", encode_us);
    println!("  Decode latency: {:.2} μs/doc", decode_us);
    println!(
        "  Encode throughput: {:.2} MB/sec\n",
        (bytes.len() * ITERATIONS) as f64 / encode_duration.as_secs_f64() / 1_000_000.0
    );
    Ok(())
}

fn benchmark_symbol_table() -> Result<(), Box<dyn Error>> {
    println!("📊 Symbol Table Benchmark (repeated messages)");
    println!("---------------------------------------------");

    const ITERATIONS: usize = 10_000;
    let doc = sample_document(20);

    let mut sender = SymbolTable::new();
    let mut receiver = SymbolTable::new();

    let first = encode(&doc, Some(&mut sender))?;
    decode_and_learn(&first, &mut receiver)?;

    let start = Instant::now();
    let mut size = 0;
    for _ in 0..ITERATIONS {
        let bytes = encode(&doc, Some(&mut sender))?;
        size = bytes.len();
        black_box(decode_and_learn(&bytes, &mut receiver)?);
    }
    let duration = start.elapsed();

    println!("  First message:  {} bytes", first.len());
    println!("  Repeat message: {} bytes", size);
    println!("  Symbols known:  {}", sender.len());
    println!(
        "  Round-trip latency: {:.2} μs/msg",
        duration.as_secs_f64() * 1e6 / ITERATIONS as f64
    );
    Ok(())
}
