//! Benchmarks for interning and keyed upserts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::schema::{Schema, SchemaBuilder};
use strata_core::DataType;
use strata_storage::{IndexedTable, RowInterner, RowStore};

fn quote_schema() -> Schema {
    SchemaBuilder::new("quotes")
        .add_field("symbol", DataType::String)
        .unwrap()
        .add_field("bid", DataType::Float64)
        .unwrap()
        .add_field("ask", DataType::Float64)
        .unwrap()
        .add_field("size", DataType::Int32)
        .unwrap()
        .build()
}

fn intern_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_interner");

    for count in [1_000i64, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::new("intern_new", count), count, |b, &count| {
            b.iter_batched(
                || (RowStore::new(), RowInterner::new()),
                |(mut store, mut interner)| {
                    for key in 0..count {
                        interner.intern(key, &mut store);
                    }
                    black_box((store, interner))
                },
                criterion::BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("intern_hit", count), count, |b, &count| {
            let mut store = RowStore::new();
            let mut interner = RowInterner::new();
            for key in 0..count {
                interner.intern(key, &mut store);
            }
            b.iter(|| {
                for key in 0..count {
                    black_box(interner.intern(key, &mut store));
                }
            });
        });
    }

    group.finish();
}

fn upsert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexed_table_upsert");
    let symbols: Vec<String> = (0..1_000).map(|i| format!("SYM{}", i)).collect();

    for updates in [1_000usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("upsert_fire", updates), updates, |b, &updates| {
            b.iter_batched(
                || IndexedTable::<String>::new(quote_schema(), &["symbol"]).unwrap(),
                |mut table| {
                    for i in 0..updates {
                        let symbol = symbols[i % symbols.len()].clone();
                        table
                            .upsert(symbol, |w| {
                                w.set(1, 100.0 + i as f64)?;
                                w.set(2, 100.5 + i as f64)?;
                                w.set(3, i as i32)
                            })
                            .unwrap();
                        if i % 100 == 99 {
                            table.fire_changes();
                        }
                    }
                    table.fire_changes();
                    black_box(table)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, intern_benchmark, upsert_benchmark);
criterion_main!(benches);
