//! Benchmarks for tree construction.
//!
//! Run with: cargo bench --bench parse

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use drill_core::{iterparse, parse_bytes, WriteOptions, XmlEvents};

/// Generate a flat catalog of `count` items, each with an attribute and
/// two children.
fn generate_catalog(count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<catalog>\n");
    for i in 0..count {
        xml.push_str(&format!("  <item id=\"id-{}\">\n", i));
        xml.push_str(&format!("    <name>Item number {}</name>\n", i));
        xml.push_str(&format!("    <price>{}.99</price>\n", i % 100));
        xml.push_str("  </item>\n");
    }
    xml.push_str("</catalog>\n");
    xml
}

/// Benchmark the fixture used by the integration tests.
fn bench_parse_fixture(c: &mut Criterion) {
    let input = include_bytes!("../tests/fixtures/catalog.xml");

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(input.len() as u64));

    group.bench_function("catalog.xml", |b| {
        b.iter(|| parse_bytes(black_box(input)).map(|doc| doc.element_count()))
    });

    group.finish();
}

/// Raw events vs. full tree vs. streaming with clearing.
fn bench_parse_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_scaling");

    for size in [100, 1000, 10000] {
        let input = generate_catalog(size);
        let bytes = input.as_bytes();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("events", size), bytes, |b, bytes| {
            b.iter(|| XmlEvents::new(black_box(bytes)).filter(|e| e.is_ok()).count())
        });
        group.bench_with_input(BenchmarkId::new("tree", size), bytes, |b, bytes| {
            b.iter(|| parse_bytes(black_box(bytes)).map(|doc| doc.element_count()))
        });
        group.bench_with_input(BenchmarkId::new("stream_clear", size), bytes, |b, bytes| {
            b.iter(|| {
                let mut stream = iterparse(black_box(bytes));
                let mut count = 0;
                while let Some(Ok(id)) = stream.next() {
                    count += 1;
                    let _ = stream.clear(id);
                }
                count
            })
        });
    }

    group.finish();
}

/// Serialization of a parsed document.
fn bench_write(c: &mut Criterion) {
    let input = generate_catalog(1000);
    let doc = match parse_bytes(input.as_bytes()) {
        Ok(doc) => doc,
        Err(err) => panic!("generated catalog failed to parse: {err}"),
    };

    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Bytes(input.len() as u64));
    for (name, options) in [
        ("pretty", WriteOptions::default()),
        ("compact", WriteOptions::compact()),
        ("latin1", WriteOptions::default().encoding(encoding_rs::WINDOWS_1252)),
    ] {
        group.bench_function(name, |b| b.iter(|| doc.xml(black_box(&options)).map(|x| x.len())));
    }
    group.finish();
}

criterion_group!(benches, bench_parse_fixture, bench_parse_scaling, bench_write);
criterion_main!(benches);
