use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bm_core::{normalize_directive, parse_dataset, QueryEngine};

fn synthetic_dataset(rows: usize) -> String {
    let mut text = String::from("domain\tcode\n");
    for i in 0..rows {
        text.push_str(&format!(
            "cdn{i}.host{}.com\t<script src=\"https://cdn{i}.host{}.com/lib.js?callback=alert\"></script>\n",
            i % 97,
            i % 97
        ));
    }
    text
}

fn bench_search(c: &mut Criterion) {
    let text = synthetic_dataset(5_000);
    let records = parse_dataset(&text);
    let engine = QueryEngine::new(&records);

    c.bench_function("parse_dataset_5k", |b| b.iter(|| parse_dataset(black_box(&text))));

    c.bench_function("search_plain", |b| b.iter(|| engine.search(black_box("host42"))));

    c.bench_function("search_directive", |b| {
        b.iter(|| {
            engine.search(black_box(
                "default-src 'none'; script-src 'self' https://*.host13.com *.host7.com cdn1.host1.com; img-src *",
            ))
        })
    });

    c.bench_function("normalize_directive", |b| {
        b.iter(|| normalize_directive(black_box("'self' https://*.a.com *.b.com c.com 'unsafe-inline' https://*.a.com")))
    });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
