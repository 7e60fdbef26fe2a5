//! Configuration loading from environment variables.
//!
//! All values come from `SAFECALL_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SAFECALL_ENFORCE_SINGLE_THREAD` | true | One running call per identifier |
//! | `SAFECALL_POOL_NAME` | safeCall | Worker pool and thread name prefix |
//! | `SAFECALL_POOL_THREADS` | 0 | Worker threads (0 = auto) |
//! | `SAFECALL_POOL_QUEUE_SIZE` | 1024 | Max tasks waiting for a worker |
//! | `SAFECALL_DEFAULT_TIMEOUT_MS` | 5000 | Default call timeout (ms) |
//! | `SAFECALL_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `SAFECALL_LOG_LEVEL` | info | Log filter directive |
//! | `SAFECALL_LOG_FORMAT` | json | `json` or `pretty` |

use std::time::Duration;

use serde::Serialize;

use crate::scheduler::ThreadPoolConfig;
use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_POOL_NAME: &str = "safeCall";

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub enforce_single_thread: bool,
    pub pool_name: String,
    pub pool_threads: usize,
    pub pool_queue_size: usize,
    pub default_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub enforce_single_thread: bool,
    pub pool_name: String,
    pub pool: ThreadPoolConfig,
    pub default_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var. Accepts true/false, 1/0, yes/no, on/off.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn load_pool_name() -> String {
    match std::env::var("SAFECALL_POOL_NAME") {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => DEFAULT_POOL_NAME.to_string(),
    }
}

fn load_pool_config() -> ThreadPoolConfig {
    let num_threads = parse_usize("SAFECALL_POOL_THREADS", 0);
    let queue_size = parse_usize("SAFECALL_POOL_QUEUE_SIZE", 1024).max(1);
    ThreadPoolConfig {
        num_threads: num_threads.min(1024),
        queue_size,
        ..Default::default()
    }
}

fn load_log_config() -> LogConfig {
    let level = std::env::var("SAFECALL_LOG_LEVEL")
        .ok()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let format = std::env::var("SAFECALL_LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig {
        format,
        level,
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let default_timeout_ms = parse_u64("SAFECALL_DEFAULT_TIMEOUT_MS", 5000);
    let shutdown_secs = parse_u64("SAFECALL_SHUTDOWN_TIMEOUT", 30).max(1);

    EnvConfig {
        enforce_single_thread: parse_bool("SAFECALL_ENFORCE_SINGLE_THREAD", true),
        pool_name: load_pool_name(),
        pool: load_pool_config(),
        default_timeout: Duration::from_millis(default_timeout_ms),
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            enforce_single_thread: self.enforce_single_thread,
            pool_name: self.pool_name.clone(),
            pool_threads: self.pool.num_threads,
            pool_queue_size: self.pool.queue_size,
            default_timeout_ms: self.default_timeout.as_millis() as u64,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            log_level: self.log.level.clone(),
            log_format: match self.log.format {
                LogFormat::Json => "json".to_string(),
                LogFormat::Pretty => "pretty".to_string(),
            },
        }
    }
}
