//! Tests for building the runtime from `SAFECALL_*` environment variables.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use safecall_core::safecall::SafeCallError;
use safecall_core::shutdown::ShutdownResult;
use safecall_core::telemetry::LogError;
use safecall_core::Runtime;

// Env vars are process-wide; keep these tests from interleaving.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_KEYS: &[&str] = &[
    "SAFECALL_POOL_NAME",
    "SAFECALL_POOL_THREADS",
    "SAFECALL_SHUTDOWN_TIMEOUT",
    "SAFECALL_DEFAULT_TIMEOUT_MS",
    "SAFECALL_LOG_LEVEL",
    "SAFECALL_LOG_FORMAT",
];

fn clear_env_vars() {
    for k in ENV_KEYS {
        std::env::remove_var(k);
    }
}

#[test]
fn from_env_applies_pool_and_shutdown_settings() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env_vars();
    std::env::set_var("SAFECALL_POOL_NAME", "envpool");
    std::env::set_var("SAFECALL_POOL_THREADS", "2");
    std::env::set_var("SAFECALL_SHUTDOWN_TIMEOUT", "3");
    std::env::set_var("SAFECALL_DEFAULT_TIMEOUT_MS", "2000");
    std::env::set_var("SAFECALL_LOG_LEVEL", "warn");
    std::env::set_var("SAFECALL_LOG_FORMAT", "pretty");

    let rt = Runtime::<u32>::from_env().unwrap();
    clear_env_vars();

    assert_eq!(rt.shutdown_timeout(), Duration::from_secs(3));
    assert_eq!(rt.caller.default_timeout(), Duration::from_millis(2000));
    assert_eq!(rt.manager.pool_name(), "envpool");

    let thread_name = rt
        .caller
        .call(1)
        .run(|_| thread::current().name().map(str::to_string))
        .unwrap()
        .into_value()
        .flatten();
    assert_eq!(thread_name.map(|n| n.starts_with("envpool-")), Some(true));

    assert_eq!(rt.close(), ShutdownResult::Complete);
    assert!(!rt.caller.is_accepting());
}

#[test]
fn from_env_rejects_invalid_log_filter() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env_vars();
    std::env::set_var("SAFECALL_LOG_LEVEL", "safecall_core=notalevel");

    let result = Runtime::<u32>::from_env();
    clear_env_vars();

    assert!(matches!(
        result,
        Err(SafeCallError::Logging(LogError::InvalidFilter(_)))
    ));
}
