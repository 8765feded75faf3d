//! Property tests for the connection pool.
//!
//! Invariants tested:
//! - in-flight checkouts never exceed `max_connections`
//! - every released entry frees capacity for a blocked caller

use modelmux_core::config::PoolConfig;
use modelmux_pool::ConnectionPool;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: for any concurrency level, in-flight checkouts never
    /// exceed the cap and all work completes.
    #[test]
    fn in_flight_never_exceeds_cap(
        cap in 1usize..6,
        tasks in 1usize..24,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let pool = Arc::new(ConnectionPool::new(PoolConfig {
                max_connections: cap,
                ..Default::default()
            }));
            let peak = Arc::new(AtomicUsize::new(0));
            let current = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for _ in 0..tasks {
                let pool = Arc::clone(&pool);
                let peak = Arc::clone(&peak);
                let current = Arc::clone(&current);
                handles.push(tokio::spawn(async move {
                    let deadline = Instant::now() + Duration::from_secs(5);
                    let entry = pool.acquire("h", deadline).await.unwrap();
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    pool.release(entry, true);
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            prop_assert!(peak.load(Ordering::SeqCst) <= cap);
            prop_assert_eq!(pool.in_flight(), 0);
            Ok(())
        })?;
    }
}
