//! Cascade scheduling benchmarks

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rf_odometer::{CascadeController, CascadeRequest, Recorder, TimingConfig, TimingPolicy};

fn bench_schedule(c: &mut Criterion) {
    let policy = TimingPolicy::new(TimingConfig::normal());
    let request = CascadeRequest::new(0, 1_234_567_890_123, 13)
        .resolve(policy.config())
        .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    c.bench_function("schedule_13_digits", |b| {
        b.iter(|| policy.schedule(black_box(&request), &mut rng))
    });
}

fn bench_full_reveal(c: &mut Criterion) {
    let mut controller = CascadeController::new(TimingConfig::normal());
    let mut seed = 0u64;

    c.bench_function("reveal_7_digits_fake_time", |b| {
        b.iter(|| {
            seed += 1;
            let recorder = Recorder::new();
            controller
                .start(
                    CascadeRequest::new(0, black_box(1_234_567), 7).with_seed(seed),
                    Box::new(recorder.clone()),
                )
                .unwrap();
            controller.run_until_idle(60_000);
            recorder.len()
        })
    });
}

criterion_group!(benches, bench_schedule, bench_full_reveal);
criterion_main!(benches);
