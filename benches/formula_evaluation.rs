//! Formula Evaluation Benchmarks
//!
//! Measures series alignment for formula evaluation and the full request
//! pipeline against the in-memory store.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kuba_compose::query::evaluator::evaluate_formula;
use kuba_compose::query::{
    parse_expression, AttributeKey, BuilderQuery, CompositeQuery, FormulaQuery, Labels,
    PanelType, QueryEngine, QueryRangeRequest,
};
use kuba_compose::store::{InMemoryStore, SeriesKey, SeriesResult};
use kuba_compose::types::{Sample, TimeRange};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Data Generators
// =============================================================================

/// One series per host with `points` samples a minute apart
fn create_series_set(hosts: usize, points: usize, offset: f64) -> Vec<SeriesResult> {
    (0..hosts)
        .map(|h| {
            let samples = (0..points)
                .map(|i| {
                    Sample::new(
                        i as i64 * 60_000,
                        offset + (i as f64 * 0.1).sin() * 10.0 + h as f64,
                    )
                })
                .collect();
            SeriesResult::new(
                SeriesKey::from_pairs([("host_name", format!("host-{}", h))]),
                samples,
            )
        })
        .collect()
}

fn create_store(hosts: usize, points: usize) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for h in 0..hosts {
        let labels = Labels::new().with_resource("host_name", format!("host-{}", h).as_str());
        let samples: Vec<_> = (0..points)
            .map(|i| Sample::new(i as i64 * 60_000, 50.0 + h as f64))
            .collect();
        store.add_series("used", labels.clone(), samples.clone());
        let totals = samples
            .into_iter()
            .map(|s| Sample::new(s.timestamp, 100.0))
            .collect();
        store.add_series("total", labels, totals);
    }
    store
}

// =============================================================================
// Benchmarks
// =============================================================================

/// Benchmark aligned binary evaluation across host counts
fn bench_alignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("formula_alignment");
    let expr = parse_expression("F1", "A / B * 100").unwrap();

    for hosts in [10usize, 100, 1000] {
        let mut results = BTreeMap::new();
        results.insert("A".to_string(), create_series_set(hosts, 60, 50.0));
        results.insert("B".to_string(), create_series_set(hosts, 60, 100.0));

        group.throughput(Throughput::Elements((hosts * 60) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(hosts), &results, |b, results| {
            b.iter(|| black_box(evaluate_formula(&expr, results).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark expression parsing
fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_expression", |b| {
        b.iter(|| {
            black_box(parse_expression("F1", black_box("(A + B) / (C - D) * 100")).unwrap())
        });
    });
}

/// Benchmark a full table request
fn bench_table_request(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = create_store(200, 60);
    let host = AttributeKey::resource("host_name");

    let composite = CompositeQuery::builder()
        .builder_query(BuilderQuery::new("A", "used").group_by(host.clone()).disabled(true))
        .builder_query(BuilderQuery::new("B", "total").group_by(host).disabled(true))
        .formula(FormulaQuery::new("F1", "A / B"))
        .panel_type(PanelType::Table)
        .build()
        .unwrap();
    let request = QueryRangeRequest::new(composite, TimeRange::new(0, 3_600_000).unwrap())
        .format_for_web(true);
    let engine = QueryEngine::default();

    c.bench_function("table_request_200_hosts", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    engine
                        .execute(&request, Arc::clone(&store), &CancellationToken::new())
                        .await
                        .unwrap(),
                )
            })
        });
    });
}

criterion_group!(benches, bench_alignment, bench_parse, bench_table_request);
criterion_main!(benches);
