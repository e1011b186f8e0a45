//! Parsing benchmarks
//!
//! Measures the three costs a host application pays:
//! 1. Building tables for the bundled Tessera grammar
//! 2. Full parses of generated programs of increasing size
//! 3. Incremental re-parses after a one-character edit
//!
//! Run with: cargo bench --bench parsing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera::languages::tessera::{grammar, language};
use tessera::prelude::*;

// ============================================================================
// Test Data
// ============================================================================

mod data {
    /// A program with `functions` small functions
    pub fn program(functions: usize) -> String {
        let mut source = String::from("using std:io:{print};\n\n");
        for i in 0..functions {
            source.push_str(&format!(
                "fn i32 f{i}(i32 a, i32 b) {{\n    \
                 mut i32 total := a * {i} + b;\n    \
                 for i32 k in 0..b {{ total += k; }}\n    \
                 if total > 100 {{ print(total); }} else {{ total -= 1; }}\n    \
                 |> total;\n}}\n\n"
            ));
        }
        source
    }

    /// The offset of the first digit of the last function's multiplier
    pub fn edit_offset(source: &str) -> usize {
        source.rfind("a * ").map(|n| n + 4).unwrap_or(0)
    }
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_build(c: &mut Criterion) {
    c.bench_function("build_tessera_tables", |b| {
        b.iter(|| black_box(grammar()).build().unwrap())
    });
}

fn bench_full_parse(c: &mut Criterion) {
    let language = language().unwrap();
    let mut parser = Parser::new();
    parser.set_language(language);

    let mut group = c.benchmark_group("full_parse");
    for functions in [1, 10, 100] {
        let source = data::program(functions);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("tessera", functions), &source, |b, input| {
            b.iter(|| parser.parse(black_box(input)).unwrap())
        });
    }
    group.finish();
}

fn bench_incremental(c: &mut Criterion) {
    let language = language().unwrap();
    let mut parser = Parser::new();
    parser.set_language(language);

    let mut group = c.benchmark_group("incremental");
    for functions in [10, 100] {
        let source = data::program(functions);
        let old = parser.parse(&source).unwrap();
        let offset = data::edit_offset(&source);
        let mut edited = source.clone();
        edited.replace_range(offset..offset + 1, "7");
        let edit = Edit::replace(offset, 1, 1);

        group.bench_with_input(
            BenchmarkId::new("tessera", functions),
            &edited,
            |b, input| b.iter(|| parser.parse_incremental(&old, &[edit], black_box(input)).unwrap()),
        );
    }
    group.finish();
}

fn bench_recovery(c: &mut Criterion) {
    let language = language().unwrap();
    let mut parser = Parser::new();
    parser.set_language(language);

    let broken = data::program(10).replace(":= a", ":= ;");
    c.bench_function("recovery_tessera_10", |b| {
        b.iter(|| parser.parse(black_box(&broken)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_build,
    bench_full_parse,
    bench_incremental,
    bench_recovery
);
criterion_main!(benches);
