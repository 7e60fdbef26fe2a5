//! Safe-call coordinator
//!
//! Guarantees that calls for a given identifier never run concurrently while
//! still letting callers attempt them from any thread.
//!
//! # Model
//!
//! - **Serialized**: at most one running call per identifier
//! - **Queued**: a call that finds its identifier busy is queued and later
//!   executed on the worker pool, FIFO per identifier
//! - **Watched**: async calls that stay claimed past their timeout are
//!   reported to their owner, who decides what to do
//! - **Local**: in-process and in-memory only; nothing survives a restart

pub mod config;
pub mod safecall;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use config::{EnvConfig, DEFAULT_POOL_NAME};
use safecall::{CallKey, SafeCallError, SafeCallManager, SafeCaller};
use scheduler::{ThreadPoolConfig, ThreadPoolManager, TokioDelayScheduler};
use shutdown::ShutdownResult;
use telemetry::LogError;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub pool_name: String,
    pub pool: ThreadPoolConfig,
    pub enforce_single_thread: bool,
    pub default_timeout: Duration,
    /// Drain budget used by [`Runtime::close`].
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool_name: DEFAULT_POOL_NAME.to_string(),
            pool: ThreadPoolConfig::default(),
            enforce_single_thread: true,
            default_timeout: Duration::from_millis(5000),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&EnvConfig> for RuntimeConfig {
    fn from(env: &EnvConfig) -> Self {
        Self {
            pool_name: env.pool_name.clone(),
            pool: env.pool.clone(),
            enforce_single_thread: env.enforce_single_thread,
            default_timeout: env.default_timeout,
            shutdown_timeout: env.shutdown_timeout,
        }
    }
}

/// A ready-to-use coordinator: worker pools, watchdog timer, manager, caller.
pub struct Runtime<K: CallKey> {
    pub pools: Arc<ThreadPoolManager>,
    pub manager: Arc<SafeCallManager<K>>,
    pub caller: SafeCaller<K>,
    shutdown_timeout: Duration,
}

impl<K: CallKey> Runtime<K> {
    /// Build a runtime from `SAFECALL_*` environment variables and install
    /// the configured log subscriber.
    ///
    /// An already installed subscriber is kept.
    pub fn from_env() -> Result<Self, SafeCallError> {
        let env = config::load();
        match telemetry::init_logging(&env.log) {
            Ok(()) | Err(LogError::AlreadyInitialized) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(config = ?env.effective_config(), "loaded safe-call configuration");
        Self::new(RuntimeConfig::from(&env))
    }

    /// Create a new runtime instance with the given configuration.
    pub fn new(config: RuntimeConfig) -> Result<Self, SafeCallError> {
        let pools = Arc::new(ThreadPoolManager::new(ThreadPoolConfig::with_threads(1)));
        pools.configure(&config.pool_name, config.pool.clone());

        // Must not match the pool's "{name}-" prefix or hooks would look safe.
        let watchdog = TokioDelayScheduler::dedicated(&format!("watchdog:{}", config.pool_name))?;
        let manager = Arc::new(SafeCallManager::new(
            Arc::new(watchdog),
            pools.clone(),
            config.pool_name.clone(),
            config.enforce_single_thread,
        ));
        let caller = SafeCaller::new(manager.clone(), config.default_timeout);

        tracing::info!(
            pool = %config.pool_name,
            enforce_single_thread = config.enforce_single_thread,
            default_timeout_ms = config.default_timeout.as_millis() as u64,
            "safe-call runtime started"
        );

        Ok(Self {
            pools,
            manager,
            caller,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// [`shutdown`](Self::shutdown) with the configured drain budget.
    pub fn close(&self) -> ShutdownResult {
        self.shutdown(self.shutdown_timeout)
    }

    /// Stop accepting calls, wait for outstanding ones, then stop the pools.
    ///
    /// Calls still queued when the timeout elapses are dropped.
    pub fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        self.caller.stop_accepting();
        let result = shutdown::wait_for_drain(&self.manager, timeout);

        let dropped = self.manager.clear_queues();
        if dropped > 0 {
            tracing::warn!(dropped, "dropping queued safe-calls at shutdown");
        }
        self.pools.shutdown_all();

        tracing::info!(?result, "safe-call runtime stopped");
        result
    }
}
