//! Benchmarks for the InfluxQL front end
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use influxql::query::{condition_expr, parse_expr, parse_query, parse_statement, reduce, NowValuer};

const QUERIES: &[&str] = &[
    "SELECT v FROM cpu",
    "SELECT mean(v) AS m, max(v) FROM db.rp.cpu WHERE host =~ /^server[0-9]+$/ AND time > now() - 1h GROUP BY time(10m), host fill(previous) LIMIT 100",
    "SELECT max(m) FROM (SELECT mean(v) AS m FROM cpu GROUP BY time(1m), host) WHERE time >= '2021-01-01T00:00:00Z' GROUP BY time(1h)",
    "SHOW TAG VALUES ON db FROM cpu WITH KEY IN (host, region) WHERE region = 'west' LIMIT 10",
    "CREATE CONTINUOUS QUERY cq ON db RESAMPLE EVERY 5m FOR 1h BEGIN SELECT mean(v) INTO db..cpu_1h FROM cpu GROUP BY time(1h) END",
];

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for (i, q) in QUERIES.iter().enumerate() {
        group.throughput(Throughput::Bytes(q.len() as u64));
        group.bench_function(format!("statement_{}", i), |b| {
            b.iter(|| parse_statement(black_box(q)).unwrap())
        });
    }

    let batch = QUERIES.join(";\n");
    group.throughput(Throughput::Bytes(batch.len() as u64));
    group.bench_function("query_batch", |b| {
        b.iter(|| parse_query(black_box(&batch)).unwrap())
    });

    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");
    let now = NowValuer::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let expr = parse_expr("time > now() - 1h + 30m AND v * (2 + 3) > 10 / 4 AND host = 'a'").unwrap();

    group.bench_function("fold_constants", |b| {
        b.iter(|| reduce(black_box(expr.clone()), Some(&now)))
    });

    group.finish();
}

fn bench_condition(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition");
    let now = NowValuer::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

    for (name, cond) in [
        ("relative", "time > now() - 1h AND host = 'a'"),
        ("absolute", "time >= '2021-01-01T00:00:00Z' AND time < '2021-01-02' AND (host = 'a' OR host = 'b')"),
    ] {
        let expr = parse_expr(cond).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| condition_expr(black_box(&expr), Some(&now)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_reduce, bench_condition);
criterion_main!(benches);
