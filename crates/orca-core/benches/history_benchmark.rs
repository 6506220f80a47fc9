//! Message History Benchmarks
//!
//! Measures the per-round bookkeeping of the agent loop:
//! - Turn appends with usage accounting
//! - Truncation of long conversations
//! - Formatting for the provider

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use orca_core::history::MessageHistory;
use orca_core::{ContentBlock, Role, Usage};

/// History with `rounds` tool round trips, each costing ~100 tokens
fn build_history(rounds: usize, budget: u64) -> MessageHistory {
    let mut history = MessageHistory::new("You are a benchmark agent.", budget, true);
    let mut reported = 0;

    for i in 0..rounds {
        history.append(Role::User, format!("Question number {}", i), None);
        reported += 50;
        let usage = Usage {
            input_tokens: reported,
            output_tokens: 50,
            ..Default::default()
        };
        history.append(
            Role::Assistant,
            vec![
                ContentBlock::text("Let me look that up."),
                ContentBlock::ToolUse {
                    id: format!("call_{}", i),
                    name: "web_search".to_string(),
                    input: json!({"query": format!("topic {}", i)}),
                },
            ],
            Some(&usage),
        );
        reported += 50;
        history.append(
            Role::User,
            vec![ContentBlock::tool_result(format!("call_{}", i), "search results", false)],
            None,
        );
    }
    history
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_append");

    for rounds in [10, 100, 1000] {
        group.throughput(Throughput::Elements(rounds as u64));
        group.bench_with_input(BenchmarkId::new("round_trips", rounds), &rounds, |b, &rounds| {
            b.iter(|| black_box(build_history(rounds, u64::MAX)))
        });
    }

    group.finish();
}

fn bench_truncate(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_truncate");

    for rounds in [100, 1000] {
        group.bench_with_input(BenchmarkId::new("to_2k_tokens", rounds), &rounds, |b, &rounds| {
            b.iter_with_setup(
                || build_history(rounds, 2_000),
                |mut history| black_box(history.truncate()),
            )
        });
    }

    group.finish();
}

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_format");

    for rounds in [10, 100, 1000] {
        let history = build_history(rounds, u64::MAX);
        group.throughput(Throughput::Elements(history.len() as u64));
        group.bench_with_input(BenchmarkId::new("format_for_api", rounds), &history, |b, history| {
            b.iter(|| black_box(history.format_for_api()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_truncate, bench_format);
criterion_main!(benches);
