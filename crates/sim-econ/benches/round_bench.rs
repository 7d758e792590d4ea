use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sim_econ::{compute_round_from_totals, lever_totals};

fn bench_round(c: &mut Criterion) {
    let state = sim_core::initial_state();
    let totals = lever_totals(400_000, 100_000, 300_000, 200_000);
    c.bench_function("compute_round", |b| {
        b.iter(|| {
            let _ = black_box(compute_round_from_totals(black_box(&state), &totals, 1));
        })
    });
}

criterion_group!(benches, bench_round);
criterion_main!(benches);
