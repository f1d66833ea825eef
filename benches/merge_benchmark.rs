//! Navigation and merge benchmarks.
//!
//! Four interleaved in-memory sources of 20k messages each, viewed 60 lines at a
//! time.
//!
//! Run with: cargo bench --bench merge_benchmark

#![allow(missing_docs)] // criterion macros generate undocumented items

use chrono::{TimeDelta, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use logscope::highlight::{MessageHighlighter, SearchHighlighter};
use logscope::model::SourceId;
use logscope::source::{MemorySource, SharedSource};
use logscope::view_state::{merge_forward, ScreenBuffer};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

const SOURCES: u64 = 4;
const MESSAGES_PER_SOURCE: i64 = 20_000;
const VIEW_SIZE: f64 = 60.0;

fn sources() -> Vec<SharedSource> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..SOURCES)
        .map(|id| {
            let messages = (0..MESSAGES_PER_SOURCE).map(move |i| {
                let at = base + TimeDelta::milliseconds(i * 10 + id as i64 * 3);
                let text = if i % 7 == 0 {
                    format!("source {} request {} started\n  detail line", id, i)
                } else {
                    format!("source {} request {} finished in {}ms", id, i, i % 97)
                };
                (at, text)
            });
            Arc::new(MemorySource::with_messages(SourceId::new(id), messages)) as SharedSource
        })
        .collect()
}

fn loaded_buffer(rt: &Runtime, fraction: f64) -> ScreenBuffer {
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let mut buffer = ScreenBuffer::new(VIEW_SIZE);
        buffer.set_sources(sources(), &cancel).await.unwrap();
        buffer.move_to_position(fraction, &cancel).await.unwrap();
        buffer
    })
}

fn bench_shift(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let buffer = loaded_buffer(&rt, 0.5);
    let mut group = c.benchmark_group("shift_by");

    for delta in [1.0, -1.0, 30.0, -30.0, 600.0] {
        group.bench_with_input(BenchmarkId::from_parameter(delta), &delta, |b, &delta| {
            b.to_async(&rt).iter_batched(
                || buffer.clone(),
                |mut buffer| async move {
                    let cancel = CancellationToken::new();
                    black_box(buffer.shift_by(delta, &cancel).await.unwrap())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_jumps(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let buffer = loaded_buffer(&rt, 0.0);
    let mut group = c.benchmark_group("jumps");

    for fraction in [0.25, 0.5, 0.75] {
        group.bench_with_input(
            BenchmarkId::new("move_to_position", fraction),
            &fraction,
            |b, &fraction| {
                b.to_async(&rt).iter_batched(
                    || buffer.clone(),
                    |mut buffer| async move {
                        let cancel = CancellationToken::new();
                        buffer.move_to_position(fraction, &cancel).await.unwrap();
                        black_box(buffer.buffer_position())
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.bench_function("move_to_streams_end", |b| {
        b.to_async(&rt).iter_batched(
            || buffer.clone(),
            |mut buffer| async move {
                let cancel = CancellationToken::new();
                buffer.move_to_streams_end(&cancel).await.unwrap();
                black_box(buffer.entries().len())
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let buffer = loaded_buffer(&rt, 0.5);

    c.bench_function("merge_forward_buffered_windows", |b| {
        b.iter(|| black_box(merge_forward(buffer.windows()).count()))
    });
}

fn bench_search(c: &mut Criterion) {
    let highlighter = SearchHighlighter::new("Request 1").unwrap();
    let text = "source 2 request 1234 finished in 17ms\n".repeat(200);

    c.bench_function("search_highlight_8k", |b| {
        b.iter(|| black_box(highlighter.highlight(black_box(&text)).len()))
    });
}

criterion_group!(benches, bench_shift, bench_jumps, bench_merge, bench_search);
criterion_main!(benches);
