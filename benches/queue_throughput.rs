// Throughput benchmarks for the concurrent priority queue: single-threaded
// insert/extract cost, and both extract-min strategies under contention.

use std::sync::Arc;
use std::thread;

use concurrent_prioq::{EmptyPolicy, ExtractOutcome, ExtractStrategy, Queue, QueueConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let config = QueueConfig::new(18, 1, i64::MIN, i64::MAX);
                let queue: Queue<i64, i64> = Queue::new(config).unwrap();
                for i in 0..size {
                    queue.insert(black_box(i), i, 0).unwrap();
                }
                black_box(queue);
            });
        });
    }

    group.finish();
}

fn bench_insert_then_drain(c: &mut Criterion) {
    c.bench_function("insert_then_drain_10k", |b| {
        b.iter(|| {
            let config = QueueConfig::new(18, 1, i64::MIN, i64::MAX)
                .with_empty_policy(EmptyPolicy::ReturnEmpty);
            let queue: Queue<i64, i64> = Queue::new(config).unwrap();
            for i in 0..10_000 {
                queue.insert(i, i, 0).unwrap();
            }
            loop {
                match queue.extract_min(0).unwrap() {
                    ExtractOutcome::Found { key, .. } => {
                        black_box(key);
                    }
                    ExtractOutcome::Empty => break,
                }
            }
        });
    });
}

fn bench_concurrent_extract_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_extract_strategy");
    const THREADS: usize = 4;
    const PER_THREAD: i64 = 5_000;

    for strategy in [ExtractStrategy::HeadCoupled, ExtractStrategy::SearchCoupled] {
        group.bench_function(format!("{strategy:?}"), |b| {
            b.iter(|| {
                let config = QueueConfig::new(18, THREADS, i64::MIN, i64::MAX)
                    .with_extract_strategy(strategy)
                    .with_empty_policy(EmptyPolicy::ReturnEmpty);
                let queue = Arc::new(Queue::<i64, i64>::new(config).unwrap());

                for tid in 0..THREADS {
                    for i in 0..PER_THREAD {
                        let key = (tid as i64) * PER_THREAD + i + 1;
                        queue.insert(key, key, tid).unwrap();
                    }
                }

                let handles: Vec<_> = (0..THREADS)
                    .map(|tid| {
                        let queue = Arc::clone(&queue);
                        thread::spawn(move || loop {
                            match queue.extract_min(tid).unwrap() {
                                ExtractOutcome::Found { key, .. } => {
                                    black_box(key);
                                }
                                ExtractOutcome::Empty => break,
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_insert_then_drain,
    bench_concurrent_extract_strategies
);
criterion_main!(benches);
