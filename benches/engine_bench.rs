//! Benchmarks for the hot control paths.
//!
//! Run with: cargo bench
//!
//! Producers run on the input path and the drain runs once per display
//! refresh; both must stay far below a 60 Hz frame budget (16.7ms).

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use padtone::config::YAxisControls;
use padtone::curve;
use padtone::engine::scheduler::{merge, PendingTask, TaskQueue};

fn bench_curve_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("curve/map");
    let controls = YAxisControls::default();

    group.bench_function("volume_linear", |b| {
        b.iter(|| curve::map(black_box(0.63), black_box(&controls.volume)))
    });
    group.bench_function("effects_exponential", |b| {
        b.iter(|| curve::map(black_box(0.63), black_box(&controls.effects)))
    });

    let mut s_curve = controls.volume;
    s_curve.curve_type = padtone::curve::CurveType::SCurve;
    s_curve.curve_factor = 3.0;
    group.bench_function("s_curve", |b| {
        b.iter(|| curve::map(black_box(0.63), black_box(&s_curve)))
    });

    group.finish();
}

fn bench_task_merge(c: &mut Criterion) {
    let start = PendingTask::Start {
        frequency: 440.0,
        velocity: 0.9,
        y_position: 0.5,
        note_id: 1,
    };
    let update = PendingTask::Update {
        frequency: 452.0,
        velocity: 0.9,
        y_position: 0.55,
    };

    c.bench_function("scheduler/merge", |b| {
        b.iter(|| merge(black_box(Some(start)), black_box(update)))
    });
}

fn bench_queue_coalescing(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler/queue");

    // A frame's worth of move events for a handful of held touches.
    for &touches in &[1usize, 4, 10] {
        group.bench_with_input(
            BenchmarkId::new("coalesce_64_moves", touches),
            &touches,
            |b, &touches| {
                b.iter(|| {
                    let mut queue = TaskQueue::default();
                    for event in 0..64u32 {
                        let touch = event % touches as u32;
                        queue.push(
                            touch,
                            PendingTask::Update {
                                frequency: 440.0 + event as f32,
                                velocity: 0.9,
                                y_position: 0.5,
                            },
                        );
                    }
                    black_box(queue.take())
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_curve_map,
    bench_task_merge,
    bench_queue_coalescing
);
criterion_main!(benches);
