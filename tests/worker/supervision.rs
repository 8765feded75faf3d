//! Supervisor behavior across a set of workers.

use modelmux_worker::{Supervisor, SupervisorConfig, WorkerStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn supervisor(stall_ms: u64) -> Arc<Supervisor> {
    Arc::new(Supervisor::new(SupervisorConfig {
        stall_threshold: Duration::from_millis(stall_ms),
        monitor_interval: Duration::from_millis(20),
    }))
}

#[tokio::test]
async fn shutdown_is_concurrent_across_workers() {
    let supervisor = supervisor(60_000);

    // Each worker takes ~80ms to wind down after the stop signal. Serial
    // shutdown of four would exceed 300ms; concurrent stays near 80ms.
    for index in 0..4 {
        supervisor
            .spawn(&format!("slow-stop-{index}"), "", |ctx| async move {
                ctx.stop.stopped().await;
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok(())
            })
            .unwrap();
    }

    let started = std::time::Instant::now();
    let leaked = supervisor.shutdown(Duration::from_secs(2)).await;
    assert_eq!(leaked, 0);
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "shutdown took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn shutdown_counts_only_unclean_stops() {
    let supervisor = supervisor(60_000);
    supervisor
        .spawn("clean-1", "", |ctx| async move {
            ctx.stop.stopped().await;
            Ok(())
        })
        .unwrap();
    supervisor
        .spawn("clean-2", "", |ctx| async move {
            ctx.stop.stopped().await;
            Ok(())
        })
        .unwrap();
    supervisor
        .spawn("wedged", "", |_ctx| async move {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(())
        })
        .unwrap();

    let leaked = supervisor.shutdown(Duration::from_millis(100)).await;
    assert_eq!(leaked, 1);
}

#[tokio::test]
async fn health_clears_once_activity_resumes() {
    let supervisor = supervisor(50);
    let beat_now = Arc::new(AtomicUsize::new(0));
    let beat_flag = Arc::clone(&beat_now);

    supervisor
        .spawn("bursty", "", move |ctx| async move {
            while !ctx.stop.is_stopped() {
                if beat_flag.load(Ordering::SeqCst) == 1 {
                    ctx.heartbeat.beat();
                }
                ctx.stop.stopped_or(Duration::from_millis(5)).await;
            }
            Ok(())
        })
        .unwrap();

    // No heartbeats yet: flagged as stalled.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(supervisor.health().len(), 1);

    // Resume beating: the flag clears.
    beat_now.store(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(supervisor.health().is_empty());

    supervisor.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn monitor_worker_registers_and_stops_with_the_rest() {
    let supervisor = supervisor(60_000);
    supervisor.start_health_monitor().unwrap();

    let names: Vec<String> = supervisor.list().into_iter().map(|w| w.name).collect();
    assert!(names.contains(&"health-monitor".to_string()));

    tokio::time::sleep(Duration::from_millis(30)).await;
    let monitor = supervisor
        .list()
        .into_iter()
        .find(|w| w.name == "health-monitor")
        .unwrap();
    assert_eq!(monitor.status, WorkerStatus::Running);

    let leaked = supervisor.shutdown(Duration::from_secs(1)).await;
    assert_eq!(leaked, 0);
}
