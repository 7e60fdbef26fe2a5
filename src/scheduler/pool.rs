//! Thread pool configuration and the named-pool registry.

use std::sync::Arc;

use dashmap::DashMap;

use super::thread_pool::{Task, ThreadPool, ThreadPoolError};

/// Configuration for a worker pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads (0 = auto-detect).
    pub num_threads: usize,
    /// Maximum number of tasks waiting for a worker.
    pub queue_size: usize,
    /// Thread stack size in bytes (0 = default).
    pub stack_size: usize,
    /// Idle wait before a worker re-checks for shutdown (milliseconds).
    pub idle_timeout_ms: u64,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0, // Auto-detect
            queue_size: 1024,
            stack_size: 0,
            idle_timeout_ms: 50,
        }
    }
}

impl ThreadPoolConfig {
    /// Create config with specific thread count.
    pub fn with_threads(count: usize) -> Self {
        Self {
            num_threads: count.max(1),
            ..Default::default()
        }
    }
}

/// Something that accepts work units for execution on other threads.
pub trait Executor: Send + Sync {
    fn submit(&self, task: Task) -> Result<(), ThreadPoolError>;
}

/// Resolves a pool name to an executor.
///
/// The coordinator never creates or sizes pools itself; it asks the provider
/// for its pool every time it dispatches.
pub trait PoolProvider: Send + Sync {
    fn pool(&self, name: &str) -> Result<Arc<dyn Executor>, ThreadPoolError>;
}

/// Registry of named thread pools, created lazily on first lookup.
pub struct ThreadPoolManager {
    pools: DashMap<String, Arc<ThreadPool>>,
    overrides: DashMap<String, ThreadPoolConfig>,
    default_config: ThreadPoolConfig,
}

impl ThreadPoolManager {
    pub fn new(default_config: ThreadPoolConfig) -> Self {
        Self {
            pools: DashMap::new(),
            overrides: DashMap::new(),
            default_config,
        }
    }

    /// Set the configuration used when pool `name` is first created.
    ///
    /// Has no effect on a pool that already exists.
    pub fn configure(&self, name: &str, config: ThreadPoolConfig) {
        self.overrides.insert(name.to_string(), config);
    }

    /// Get or create the pool called `name`.
    pub fn get_pool(&self, name: &str) -> Result<Arc<ThreadPool>, ThreadPoolError> {
        if let Some(pool) = self.pools.get(name) {
            return Ok(pool.clone());
        }

        let config = self
            .overrides
            .get(name)
            .map(|c| c.clone())
            .unwrap_or_else(|| self.default_config.clone());

        let entry = self
            .pools
            .entry(name.to_string())
            .or_try_insert_with(|| ThreadPool::new(name, config).map(Arc::new))?;
        Ok(entry.value().clone())
    }

    /// Names of all pools created so far.
    pub fn pool_names(&self) -> Vec<String> {
        self.pools.iter().map(|p| p.key().clone()).collect()
    }

    /// Signal every pool to stop. Workers exit without running queued tasks.
    pub fn shutdown_all(&self) {
        for pool in self.pools.iter() {
            pool.signal_shutdown();
        }
    }
}

impl Default for ThreadPoolManager {
    fn default() -> Self {
        Self::new(ThreadPoolConfig::default())
    }
}

impl PoolProvider for ThreadPoolManager {
    fn pool(&self, name: &str) -> Result<Arc<dyn Executor>, ThreadPoolError> {
        let pool: Arc<dyn Executor> = self.get_pool(name)?;
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_threads_floor() {
        assert_eq!(ThreadPoolConfig::with_threads(0).num_threads, 1);
        assert_eq!(ThreadPoolConfig::with_threads(3).num_threads, 3);
    }

    #[test]
    fn test_same_name_returns_same_pool() {
        let manager = ThreadPoolManager::new(ThreadPoolConfig::with_threads(1));
        let a = manager.get_pool("shared").unwrap();
        let b = manager.get_pool("shared").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.pool_names(), vec!["shared".to_string()]);
    }

    #[test]
    fn test_configure_applies_on_creation() {
        let manager = ThreadPoolManager::new(ThreadPoolConfig::with_threads(1));
        manager.configure("wide", ThreadPoolConfig::with_threads(3));
        assert_eq!(manager.get_pool("wide").unwrap().num_threads(), 3);
        assert_eq!(manager.get_pool("narrow").unwrap().num_threads(), 1);
    }

    #[test]
    fn test_shutdown_all() {
        let manager = ThreadPoolManager::new(ThreadPoolConfig::with_threads(1));
        let pool = manager.get_pool("p").unwrap();
        manager.shutdown_all();
        assert!(pool.is_shutdown());
        assert!(manager.pool("p").unwrap().submit(Box::new(|| {})).is_err());
    }
}
