//! Propagation benchmarks: cost of one input write through a session graph.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use reactant_core::Session;

fn fan_out(width: usize) -> Session {
    let session = Session::headless();
    let _ = session.signal("x", json!(0));

    let branches: Vec<_> = (0..width)
        .map(|i| {
            session.derived(format!("branch_{i}"), move |s| {
                let x = s.get("x")?.as_i64().unwrap_or(0);
                Ok(json!(x + i as i64))
            })
        })
        .collect();

    let _ = session.observe("sum", move |s| {
        let mut total = 0;
        for branch in &branches {
            total += branch.get(s)?.as_i64().unwrap_or(0);
        }
        black_box(total);
        Ok(())
    });
    session
}

fn chain(depth: usize) -> Session {
    let session = Session::headless();
    let _ = session.signal("x", json!(0));

    let mut last = session.derived("link_0", |s| s.get("x"));
    for i in 1..depth {
        let previous = last;
        last = session.derived(format!("link_{i}"), move |s| {
            let n = previous.get(s)?.as_i64().unwrap_or(0);
            Ok(json!(n + 1))
        });
    }

    let _ = session.observe("tail", move |s| {
        black_box(last.get(s)?);
        Ok(())
    });
    session
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10, 100, 1000] {
        let session = fan_out(width);
        let mut n = 0;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                n += 1;
                black_box(session.set("x", json!(n)))
            });
        });
    }
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for depth in [10, 100] {
        let session = chain(depth);
        let mut n = 0;
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                n += 1;
                black_box(session.set("x", json!(n)))
            });
        });
    }
    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let session = fan_out(100);
    let mut n = 0;
    c.bench_function("batched_writes", |b| {
        b.iter(|| {
            n += 1;
            black_box(session.apply([("x", json!(n)), ("x", json!(n + 1))]))
        });
    });
}

criterion_group!(benches, bench_fan_out, bench_chain, bench_batched_writes);
criterion_main!(benches);
