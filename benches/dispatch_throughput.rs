//! Safe-call dispatch benchmarks.
//!
//! Measures registry bookkeeping, queue draining, and full round trips
//! through the worker pool.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use safecall_core::safecall::{HandlerKind, Invocation, SafeCallManager, TrackingWrapper};
use safecall_core::scheduler::{
    DelayScheduler, Executor, PoolProvider, Task, ThreadPoolConfig, ThreadPoolError, TimerCallback,
    TimerHandle,
};
use safecall_core::{Runtime, RuntimeConfig};

/// Collects submitted tasks so the benchmark decides when they run.
#[derive(Clone, Default)]
struct DeferredPool {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl DeferredPool {
    fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.tasks.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Executor for DeferredPool {
    fn submit(&self, task: Task) -> Result<(), ThreadPoolError> {
        self.tasks.lock().push_back(task);
        Ok(())
    }
}

impl PoolProvider for DeferredPool {
    fn pool(&self, _name: &str) -> Result<Arc<dyn Executor>, ThreadPoolError> {
        Ok(Arc::new(self.clone()))
    }
}

/// Timers that never fire.
struct NullTimers;

impl DelayScheduler for NullTimers {
    fn schedule(&self, _delay: Duration, _callback: TimerCallback) -> TimerHandle {
        TimerHandle::new(CancellationToken::new())
    }
}

fn manager(pool: &DeferredPool) -> Arc<SafeCallManager<u32>> {
    Arc::new(SafeCallManager::new(
        Arc::new(NullTimers),
        Arc::new(pool.clone()),
        "bench",
        true,
    ))
}

fn bench_start_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");
    let pool = DeferredPool::default();
    let manager = manager(&pool);

    for kind in [HandlerKind::Sync, HandlerKind::Async] {
        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("start_end", kind.as_str()), |b| {
            b.iter(|| {
                let invocation = Arc::new(Invocation::new(7, kind, Duration::from_secs(1), |_| {}));
                let wrapper = TrackingWrapper::new(invocation.clone());
                let started = manager.record_call_start(&invocation, &wrapper);
                black_box(started.is_started());
                manager.record_call_end(&invocation, &wrapper);
            })
        });
    }

    group.finish();
}

fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_drain");

    for depth in [1usize, 16, 256] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_function(BenchmarkId::new("single_identifier", depth), |b| {
            let pool = DeferredPool::default();
            let manager = manager(&pool);
            b.iter(|| {
                for _ in 0..depth {
                    manager.enqueue(Arc::new(Invocation::new(
                        1,
                        HandlerKind::Async,
                        Duration::from_secs(1),
                        |_| {
                            black_box(0u64);
                        },
                    )));
                }
                black_box(pool.drain());
            })
        });

        group.bench_function(BenchmarkId::new("spread_identifiers", depth), |b| {
            let pool = DeferredPool::default();
            let manager = manager(&pool);
            b.iter(|| {
                for i in 0..depth {
                    manager.enqueue(Arc::new(Invocation::new(
                        i as u32,
                        HandlerKind::Async,
                        Duration::from_secs(1),
                        |_| {
                            black_box(0u64);
                        },
                    )));
                }
                black_box(pool.drain());
            })
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    let config = RuntimeConfig {
        pool_name: "bench".to_string(),
        pool: ThreadPoolConfig::with_threads(4),
        ..Default::default()
    };
    let Ok(runtime) = Runtime::<u32>::new(config) else {
        return;
    };

    group.throughput(Throughput::Elements(1));
    group.bench_function("sync_call", |b| {
        let mut id = 0u32;
        b.iter(|| {
            id = id.wrapping_add(1) % 64;
            let outcome = runtime.caller.call(id).run(|_| black_box(42u64));
            black_box(outcome.ok().and_then(|o| o.into_value()))
        })
    });

    group.finish();
    runtime.shutdown(Duration::from_secs(5));
}

criterion_group!(benches, bench_start_end, bench_queue_drain, bench_round_trip);
criterion_main!(benches);
