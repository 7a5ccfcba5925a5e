// benches/bench_local_episode.rs
use criterion::{black_box, Criterion, criterion_group, criterion_main};
use std::time::Duration;

use tlcs_eval::config::EvalConfig;
use tlcs_eval::control_system::selector::SelectorKind;
use tlcs_eval::simulation_engine::evaluation::{evaluate_fixed_cycle, evaluate_model};

// A short episode on the in-process intersection, heuristic model.
fn short_config() -> EvalConfig {
    EvalConfig {
        max_steps: 600,
        n_cars_generated: 120,
        ..EvalConfig::default()
    }
}

fn bench_episode(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_episode");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    let config = short_config();
    group.bench_function("model_movement_selector", |b| {
        b.iter(|| black_box(evaluate_model(&config, SelectorKind::Movement).unwrap()));
    });
    group.bench_function("fixed_cycle", |b| {
        b.iter(|| black_box(evaluate_fixed_cycle(&config).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_episode);
criterion_main!(benches);
