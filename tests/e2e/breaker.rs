//! Scenario 4: the breaker opens, rejects fast, and recovers.

use super::support::{messages_body, provider, StubMode, StubUpstream, TestGateway};
use std::time::{Duration, Instant};

#[tokio::test]
async fn breaker_opens_rejects_fast_and_recovers() {
    let stub = StubUpstream::spawn(StubMode::Status {
        code: 500,
        delay_ms: 10,
    })
    .await;
    let gateway = TestGateway::spawn(vec![provider("P1", &stub.endpoint(), 1)], |config| {
        config.breaker.failure_threshold = 3;
        config.breaker.recovery_timeout_ms = 200;
        config.breaker.success_threshold = 1;
    })
    .await;

    // The first three requests reach P1 and fail.
    for _ in 0..3 {
        let response = gateway.post_messages(&messages_body()).await;
        assert_eq!(response.status().as_u16(), 502);
    }
    assert_eq!(stub.hits(), 3);

    // Breaker is now open: requests 4 and 5 are rejected locally without
    // an upstream call, and fast.
    for _ in 0..2 {
        let started = Instant::now();
        let response = gateway.post_messages(&messages_body()).await;
        assert_eq!(response.status().as_u16(), 502);
        assert!(
            started.elapsed() < Duration::from_millis(50),
            "local rejection took {:?}",
            started.elapsed()
        );
    }
    assert_eq!(stub.hits(), 3);

    let health: serde_json::Value = gateway
        .client
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["providers"][0]["breaker_state"], "open");

    // After the recovery timeout a flipped stub closes the circuit again.
    tokio::time::sleep(Duration::from_millis(250)).await;
    stub.set_mode(StubMode::Ok {
        text: "hi".to_string(),
        delay_ms: 10,
    });

    let response = gateway.post_messages(&messages_body()).await;
    assert_eq!(response.status().as_u16(), 200);

    let health: serde_json::Value = gateway
        .client
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["providers"][0]["breaker_state"], "closed");
    assert_eq!(health["providers"][0]["healthy"], true);
}
