//! Benchmarks for context windowing.
//!
//! Windowing runs before every clarification and explanation, over a history
//! that grows without bound, so its cost should track the window size rather
//! than the history size.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use parley_chat::context::{select_window, ContextStore};
use parley_core::types::{Turn, TurnRole};
use parley_storage::{Database, TenantRepository, TurnRepository};

/// A turn of roughly 20 to 60 words.
fn make_turn(index: usize) -> Turn {
    let words = 20 + (index * 7) % 40;
    Turn {
        id: Uuid::new_v4(),
        seq: index as i64,
        tenant: "acme".to_string(),
        user: "u1".to_string(),
        role: TurnRole::ALL[index % TurnRole::ALL.len()],
        text: (0..words)
            .map(|w| format!("word{}", w))
            .collect::<Vec<_>>()
            .join(" "),
        created_at: Utc::now(),
    }
}

fn bench_select_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_window");
    group.measurement_time(Duration::from_secs(5));

    for size in [100usize, 1_000, 10_000] {
        let turns: Vec<Turn> = (0..size).map(make_turn).collect();
        group.bench_with_input(BenchmarkId::new("budget_2000", size), &turns, |b, turns| {
            b.iter(|| select_window(turns, 2000).len());
        });
    }

    group.finish();
}

fn bench_store_window(c: &mut Criterion) {
    let db = Arc::new(Database::in_memory().unwrap());
    TenantRepository::new(Arc::clone(&db))
        .ensure_tenant("acme")
        .unwrap();
    let store = ContextStore::new(TurnRepository::new(db));
    for i in 0..5_000 {
        let turn = make_turn(i);
        store.append("acme", "u1", turn.role, &turn.text).unwrap();
    }

    let mut group = c.benchmark_group("store_window");
    group.sample_size(50);

    for budget in [500usize, 2_000, 8_000] {
        group.bench_with_input(BenchmarkId::new("history_5000", budget), &budget, |b, &budget| {
            b.iter(|| store.window("acme", "u1", budget).unwrap().len());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select_window, bench_store_window);
criterion_main!(benches);
