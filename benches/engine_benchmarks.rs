//! Performance benchmarks for the kata engine
//!
//! Run with: cargo bench
//!
//! Covers interpreter start-up, raw evaluation, value snapshots and whole
//! test batches through the engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kata::runtime::{to_datum, Runtime};
use kata::{Datum, TestCase, TestEngine};
use serde_json::json;

const PROCESS_USERS: &str = r#"
function processUsers(users) {
    const emails = users.map(user => user.email);
    const adults = users.filter(user => user.age > 25);
    return { emails, adults };
}
"#;

fn users(count: usize) -> Datum {
    Datum::from(json!((0..count)
        .map(|i| json!({ "name": format!("user{}", i), "email": format!("user{}@example.com", i), "age": 18 + i % 30 }))
        .collect::<Vec<_>>()))
}

/// Benchmark: Runtime initialization with all builtins installed
fn bench_cold_start(c: &mut Criterion) {
    c.bench_function("cold_start", |b| {
        b.iter(|| black_box(Runtime::new()))
    });
}

/// Benchmark: Evaluation throughput
fn bench_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval");

    group.bench_function("arithmetic", |b| {
        let mut runtime = Runtime::new();
        b.iter(|| runtime.eval(black_box("1 + 2 * 3 - 4 / 2")).unwrap())
    });

    group.bench_function("fibonacci_15", |b| {
        b.iter(|| {
            let mut runtime = Runtime::new();
            runtime
                .eval(black_box(
                    "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } return fib(15)",
                ))
                .unwrap()
        })
    });

    group.bench_function("array_pipeline", |b| {
        b.iter(|| {
            let mut runtime = Runtime::new();
            runtime
                .eval(black_box(
                    "return Array.from({ length: 1000 }, (_, i) => i).filter(x => x % 3 === 0).map(x => x * 2).reduce((a, b) => a + b, 0)",
                ))
                .unwrap()
        })
    });

    group.finish();
}

/// Benchmark: Snapshotting interpreter values into data
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [10usize, 100, 1000] {
        let mut runtime = Runtime::new();
        let value = runtime
            .eval(&format!(
                "return Array.from({{ length: {} }}, (_, i) => ({{ id: i, tags: ['a', 'b'] }}))",
                size
            ))
            .unwrap();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.iter(|| to_datum(black_box(value)))
        });
    }

    group.finish();
}

/// Benchmark: Whole batches through the engine, worker thread included
fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let engine = TestEngine::default();

    for cases in [1usize, 10] {
        let batch: Vec<TestCase> = (0..cases)
            .map(|i| {
                TestCase::new(format!("case {}", i), Datum::Undefined).with_input(vec![users(50)])
            })
            .collect();
        group.throughput(Throughput::Elements(cases as u64));
        group.bench_with_input(BenchmarkId::new("process_users", cases), &batch, |b, batch| {
            b.iter(|| engine.execute(black_box(PROCESS_USERS), batch))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cold_start,
    bench_eval,
    bench_snapshot,
    bench_engine,
);

criterion_main!(benches);
