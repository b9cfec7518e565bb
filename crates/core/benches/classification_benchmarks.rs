use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Duration, NaiveDate};
use remindr_core::{classify, ClassifyContext, FormatChainParser, Record};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// A page of rows with a realistic mix: mostly overdue, some done, some
/// future-dated, some already reminded today, a few malformed.
fn sample_page(size: usize) -> Vec<Record> {
    (0..size)
        .map(|i| {
            let due = today() - Duration::days((i % 40) as i64 - 5);
            let mut record = Record::new(
                format!("Task {i}"),
                format!("owner{}@example.com", i % 97),
                due.format("%m/%d/%Y").to_string(),
            );
            match i % 10 {
                0 => record = record.with_status("Done"),
                1 => record = record.with_last_action("2026-10-19 07:15:00"),
                2 => record.recipient.clear(),
                _ => {}
            }
            record
        })
        .collect()
}

fn bench_classification(c: &mut Criterion) {
    let parser = FormatChainParser::default();
    let ctx = ClassifyContext::new(today());

    let mut group = c.benchmark_group("classify_page");
    for size in [500usize, 5_000] {
        let page = sample_page(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &page, |b, page| {
            b.iter(|| {
                let eligible = page
                    .iter()
                    .filter(|r| classify(black_box(r), &ctx, &parser).is_eligible())
                    .count();
                black_box(eligible)
            })
        });
    }
    group.finish();
}

fn bench_date_chain(c: &mut Criterion) {
    let parser = FormatChainParser::default();
    let inputs = ["2026-10-19", "10/19/2026", "Oct 19, 2026", "not a date"];

    c.bench_function("date_chain_mixed", |b| {
        b.iter(|| {
            for text in inputs {
                black_box(remindr_core::DateParser::parse(&parser, black_box(text)));
            }
        })
    });
}

criterion_group!(benches, bench_classification, bench_date_chain);
criterion_main!(benches);
