//! Single-worker lifecycle behavior.

use modelmux_worker::{JoinOutcome, Worker, WorkerStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn info_reflects_progress_while_running() {
    let worker = Worker::new("ticker", "counts units of work");
    let units = Arc::new(AtomicUsize::new(0));
    let units_clone = Arc::clone(&units);

    worker
        .start(move |ctx| async move {
            while !ctx.stop.is_stopped() {
                units_clone.fetch_add(1, Ordering::SeqCst);
                ctx.heartbeat.beat();
                ctx.heartbeat.set_memory_hint(4_096);
                ctx.stop.stopped_or(Duration::from_millis(5)).await;
            }
            Ok(())
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    let info = worker.info();
    assert_eq!(info.name, "ticker");
    assert_eq!(info.status, WorkerStatus::Running);
    assert!(info.operations_completed >= 1);
    assert!(info.uptime.unwrap() >= Duration::from_millis(30));
    assert!(info.activity_age.unwrap() < Duration::from_secs(1));
    assert_eq!(info.approx_memory_bytes, 4_096);
    assert!(!info.stop_requested);

    worker.request_stop();
    assert!(worker.info().stop_requested);
    assert_eq!(
        worker.join(Duration::from_secs(1)).await.unwrap(),
        JoinOutcome::Completed
    );
    assert_eq!(worker.info().status, WorkerStatus::Stopped);
}

#[tokio::test]
async fn stop_signal_wakes_a_sleeping_body() {
    let worker = Worker::new("sleeper", "");
    worker
        .start(|ctx| async move {
            // Long nominal sleep; the stop signal must cut it short.
            ctx.stop.stopped_or(Duration::from_secs(3_600)).await;
            Ok(())
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    worker.request_stop();

    let outcome = worker.join(Duration::from_millis(500)).await.unwrap();
    assert_eq!(outcome, JoinOutcome::Completed);
}

#[tokio::test]
async fn terminal_error_preserves_the_last_error() {
    let worker = Worker::new("faulty", "");
    worker
        .start(|_ctx| async move { Err("backing store unavailable".into()) })
        .unwrap();

    worker.join(Duration::from_secs(1)).await.unwrap();
    let info = worker.info();
    assert!(info.status.is_terminal());
    assert_eq!(info.last_error.as_deref(), Some("backing store unavailable"));
}

#[tokio::test]
async fn completed_worker_can_be_started_again() {
    let worker = Worker::new("reusable", "");
    worker.start(|_ctx| async move { Ok(()) }).unwrap();
    worker.join(Duration::from_secs(1)).await.unwrap();
    assert_eq!(worker.status(), WorkerStatus::Stopped);

    // A clean stop frees the slot for a fresh body.
    worker
        .start(|ctx| async move {
            ctx.stop.stopped().await;
            Ok(())
        })
        .unwrap();
    worker.request_stop();
    worker.join(Duration::from_secs(1)).await.unwrap();
}
