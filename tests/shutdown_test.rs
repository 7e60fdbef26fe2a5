//! Tests for graceful shutdown of the safe-call runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use safecall_core::safecall::SafeCallError;
use safecall_core::scheduler::ThreadPoolConfig;
use safecall_core::shutdown::{wait_for_drain, ShutdownResult};
use safecall_core::{Runtime, RuntimeConfig};

fn runtime(pool_name: &str) -> Runtime<u32> {
    let config = RuntimeConfig {
        pool_name: pool_name.to_string(),
        pool: ThreadPoolConfig::with_threads(2),
        ..Default::default()
    };
    Runtime::new(config).unwrap()
}

#[test]
fn test_idle_runtime_drains_immediately() {
    let rt = runtime("idle");
    assert_eq!(wait_for_drain(&rt.manager, Duration::from_millis(50)), ShutdownResult::Complete);
    assert_eq!(rt.shutdown(Duration::from_millis(50)), ShutdownResult::Complete);
}

#[test]
fn test_shutdown_waits_for_queued_calls() {
    let rt = runtime("queued");
    let executed = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let executed = executed.clone();
        rt.caller
            .call(7)
            .with_async()
            .run(move |_| {
                thread::sleep(Duration::from_millis(10));
                executed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    assert_eq!(rt.shutdown(Duration::from_secs(5)), ShutdownResult::Complete);
    assert_eq!(executed.load(Ordering::SeqCst), 5);
    assert!(rt.manager.is_idle());
}

#[test]
fn test_calls_refused_after_shutdown() {
    let rt = runtime("refuse");
    rt.shutdown(Duration::from_millis(100));

    assert!(!rt.caller.is_accepting());
    let err = rt.caller.call(1).run(|_| ()).unwrap_err();
    assert!(matches!(err, SafeCallError::ShuttingDown));
    let err = rt.caller.call(1).with_async().run(|_| ()).unwrap_err();
    assert!(matches!(err, SafeCallError::ShuttingDown));
}

#[test]
fn test_shutdown_timeout_reports_and_drops_queue() {
    let rt = runtime("stuck");
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    rt.caller
        .call(3)
        .with_async()
        .run(move |_| {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        })
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = ran.clone();
        rt.caller
            .call(3)
            .with_async()
            .run(move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    // One running call plus three waiting behind it.
    let result = wait_for_drain(&rt.manager, Duration::from_millis(50));
    assert_eq!(result, ShutdownResult::Timeout { remaining: 4 });

    let result = rt.shutdown(Duration::from_millis(50));
    assert!(matches!(result, ShutdownResult::Timeout { .. }));
    assert_eq!(rt.manager.queued_total(), 0);

    release_tx.send(()).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}
