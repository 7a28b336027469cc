//! Readiness gate polling, driven on tokio's paused clock.

use shapescan::runtime::{BuiltinBackend, GateFailure, GatePolicy, RuntimeGate, RuntimeStatus};
use shapescan::VisionError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Probe that becomes loaded on the given poll (0 = the immediate check)
fn probe_ready_on(poll: Option<u32>) -> (Arc<AtomicU32>, impl Fn() -> bool + Send + Sync + 'static) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let probe = move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        poll.is_some_and(|ready_at| n >= ready_at)
    };
    (calls, probe)
}

#[tokio::test(start_paused = true)]
async fn test_immediately_available_backend() {
    let (gate, task) = RuntimeGate::start(BuiltinBackend, GatePolicy::default());

    assert_eq!(gate.check_ready(), RuntimeStatus::READY);
    assert!(task.is_finished());
    assert!(gate.ensure_ready().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_ready_on_tick_37() {
    let (calls, probe) = probe_ready_on(Some(37));
    let (gate, _task) = RuntimeGate::start(probe, GatePolicy::default());

    let initial = gate.check_ready();
    assert!(!initial.ready);
    assert_eq!(initial.progress_percent, 0);
    assert!(matches!(gate.ensure_ready(), Err(VisionError::LibraryNotReady)));

    let status = gate.wait_settled().await;
    assert!(status.ready);
    assert_eq!(status.progress_percent, 100);
    assert_eq!(status.error, None);
    // Immediate check plus 37 ticks
    assert_eq!(calls.load(Ordering::SeqCst), 38);
}

#[tokio::test(start_paused = true)]
async fn test_progress_tracks_attempts() {
    let (_calls, probe) = probe_ready_on(None);
    let (gate, _task) = RuntimeGate::start(probe, GatePolicy::default());

    tokio::time::sleep(Duration::from_millis(1050)).await;

    let status = gate.check_ready();
    assert!(!status.ready);
    assert_eq!(status.progress_percent, 10);
    assert_eq!(status.error, None);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_after_max_attempts() {
    let (calls, probe) = probe_ready_on(None);
    let (gate, task) = RuntimeGate::start(probe, GatePolicy::default());

    let status = gate.wait_settled().await;
    assert!(!status.ready);
    assert_eq!(status.error, Some(GateFailure::LibraryLoadTimeout));
    assert_eq!(calls.load(Ordering::SeqCst), 101);

    // No further polling once failed
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 101);
    assert!(task.is_finished());
    assert_eq!(gate.check_ready(), status);
}

#[tokio::test(start_paused = true)]
async fn test_progress_scales_with_custom_budget() {
    let (_calls, probe) = probe_ready_on(None);
    let policy = GatePolicy {
        poll_interval: Duration::from_millis(10),
        max_attempts: 4,
    };
    let (gate, _task) = RuntimeGate::start(probe, policy);

    tokio::time::sleep(Duration::from_millis(25)).await;
    assert_eq!(gate.check_ready().progress_percent, 50);

    let status = gate.wait_settled().await;
    assert_eq!(status.progress_percent, 100);
    assert!(!status.ready);
    assert_eq!(status.error, Some(GateFailure::LibraryLoadTimeout));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() {
    let (calls, probe) = probe_ready_on(None);
    let (gate, task) = RuntimeGate::start(probe, GatePolicy::default());

    tokio::time::sleep(Duration::from_millis(250)).await;
    task.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let polled = calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(calls.load(Ordering::SeqCst), polled);

    let status = gate.check_ready();
    assert!(!status.ready);
    assert_eq!(status.error, None);

    // A cancelled gate settles on its last status instead of hanging
    assert_eq!(gate.wait_settled().await, status);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_task_stops_polling() {
    let (calls, probe) = probe_ready_on(None);
    let (_gate, task) = RuntimeGate::start(probe, GatePolicy::default());

    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(task);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let polled = calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), polled);
}

#[test]
fn test_status_json_shape() -> anyhow::Result<()> {
    let failed = RuntimeStatus {
        ready: false,
        progress_percent: 100,
        error: Some(GateFailure::LibraryLoadTimeout),
    };
    let value = serde_json::to_value(failed)?;
    assert_eq!(value["progressPercent"], 100);
    assert_eq!(value["error"], "LibraryLoadTimeout");
    Ok(())
}
