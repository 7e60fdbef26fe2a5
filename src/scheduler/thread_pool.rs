//! Named worker thread pool for safe-call execution.
//!
//! Worker threads are named `{pool_name}-{index}` so code running on them can
//! be recognised by the coordinator's safe-context check.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::pool::{Executor, ThreadPoolConfig};

/// A task to be executed by the thread pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Statistics for thread pool performance.
#[derive(Debug, Default, Clone)]
pub struct ThreadPoolStats {
    pub total_tasks_executed: u64,
    pub tasks_panicked: u64,
    pub queue_overflows: u64,
    pub avg_exec_time_us: u64,
    pub queued: usize,
    pub threads_active: usize,
    pub threads_idle: usize,
}

/// State shared between the pool handle and its workers.
struct Shared {
    queue: Mutex<VecDeque<Task>>,
    available: Condvar,
    shutdown: AtomicBool,
    active: AtomicUsize,
    stats: Mutex<ThreadPoolStats>,
}

/// Fixed-size FIFO thread pool.
pub struct ThreadPool {
    name: String,
    config: ThreadPoolConfig,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Create a pool named `name`. Worker threads are spawned immediately.
    pub fn new(name: impl Into<String>, config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let name = name.into();
        let num_threads = if config.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            config.num_threads
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(config.queue_size)),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            stats: Mutex::new(ThreadPoolStats::default()),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let mut builder = thread::Builder::new().name(format!("{}-{}", name, id));
            if config.stack_size > 0 {
                builder = builder.stack_size(config.stack_size);
            }
            let shared_clone = shared.clone();
            let idle_timeout = Duration::from_millis(config.idle_timeout_ms.max(1));
            let handle = builder
                .spawn(move || Self::worker_loop(&shared_clone, idle_timeout))
                .map_err(|e| {
                    // Let the workers spawned so far exit.
                    shared.shutdown.store(true, Ordering::SeqCst);
                    shared.available.notify_all();
                    ThreadPoolError::ThreadSpawnFailed(e.to_string())
                })?;
            workers.push(handle);
        }

        tracing::debug!(pool = %name, threads = num_threads, "thread pool started");

        Ok(Self {
            name,
            config,
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Pool name, also the worker thread name prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a task for execution.
    pub fn submit(&self, task: Task) -> Result<(), ThreadPoolError> {
        if self.shared.shutdown.load(Ordering::SeqCst) {
            return Err(ThreadPoolError::PoolShutdown);
        }

        {
            let mut q = self.shared.queue.lock();
            if q.len() >= self.config.queue_size {
                self.shared.stats.lock().queue_overflows += 1;
                return Err(ThreadPoolError::QueueFull);
            }
            q.push_back(task);
        }

        self.shared.available.notify_one();
        Ok(())
    }

    fn worker_loop(shared: &Shared, idle_timeout: Duration) {
        loop {
            let task = {
                let mut q = shared.queue.lock();
                loop {
                    if shared.shutdown.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Some(task) = q.pop_front() {
                        break task;
                    }
                    shared.available.wait_for(&mut q, idle_timeout);
                }
            };

            shared.active.fetch_add(1, Ordering::SeqCst);
            let start = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(task));
            let exec_us = start.elapsed().as_micros() as u64;
            shared.active.fetch_sub(1, Ordering::SeqCst);

            let mut s = shared.stats.lock();
            s.total_tasks_executed += 1;
            if outcome.is_err() {
                s.tasks_panicked += 1;
                tracing::error!("thread pool task panicked");
            }
            // Rolling average of execution time
            if s.avg_exec_time_us == 0 {
                s.avg_exec_time_us = exec_us;
            } else {
                s.avg_exec_time_us = (s.avg_exec_time_us * 9 + exec_us) / 10;
            }
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> ThreadPoolStats {
        let mut stats = self.shared.stats.lock().clone();
        stats.queued = self.shared.queue.lock().len();
        stats.threads_active = self.shared.active.load(Ordering::SeqCst);
        stats.threads_idle = self.num_threads().saturating_sub(stats.threads_active);
        stats
    }

    /// Get number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.workers.lock().len()
    }

    /// Check if pool is shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Signal shutdown (does not wait for threads). Queued tasks are dropped.
    pub fn signal_shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.available.notify_all();
    }

    /// Signal shutdown and wait for all workers to exit.
    ///
    /// A worker calling this on its own pool skips joining itself.
    pub fn join(&self) {
        self.signal_shutdown();

        let current = thread::current().id();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
        self.shared.queue.lock().clear();
    }
}

impl Executor for ThreadPool {
    fn submit(&self, task: Task) -> Result<(), ThreadPoolError> {
        ThreadPool::submit(self, task)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.name)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Errors for thread pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadPoolError {
    #[error("Thread pool is shut down")]
    PoolShutdown,

    #[error("Task queue is full")]
    QueueFull,

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawnFailed(String),
}
