//! Scenario 3: failover to the next provider on 5xx.

use super::support::{messages_body, provider, StubMode, StubUpstream, TestGateway};

#[tokio::test]
async fn five_xx_fails_over_to_lower_priority_provider() {
    let failing = StubUpstream::spawn(StubMode::Status {
        code: 500,
        delay_ms: 10,
    })
    .await;
    let healthy = StubUpstream::spawn(StubMode::Ok {
        text: "hi".to_string(),
        delay_ms: 30,
    })
    .await;

    let gateway = TestGateway::spawn(
        vec![
            provider("P1", &failing.endpoint(), 1),
            provider("P2", &healthy.endpoint(), 2),
        ],
        |_| {},
    )
    .await;

    let response = gateway.post_messages(&messages_body()).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["content"][0]["text"], "hi");
    assert_eq!(body["provider_used"], "P2");

    let p1 = gateway.provider_metrics("P1").await;
    assert_eq!(p1["errors"]["server"], 1);
    assert_eq!(p1["successes"], 0);

    let p2 = gateway.provider_metrics("P2").await;
    assert_eq!(p2["successes"], 1);

    assert_eq!(failing.hits(), 1);
    assert_eq!(healthy.hits(), 1);
}

#[tokio::test]
async fn retries_prefer_a_different_provider_group() {
    let failing = StubUpstream::spawn(StubMode::Status {
        code: 500,
        delay_ms: 5,
    })
    .await;
    let same_group = StubUpstream::spawn(StubMode::Ok {
        text: "same group".to_string(),
        delay_ms: 5,
    })
    .await;
    let other_group = StubUpstream::spawn(StubMode::Ok {
        text: "other group".to_string(),
        delay_ms: 5,
    })
    .await;

    let mut a1 = provider("A1", &failing.endpoint(), 1);
    a1.group_id = Some("acct-a".to_string());
    let mut a2 = provider("A2", &same_group.endpoint(), 1);
    a2.group_id = Some("acct-a".to_string());
    let mut b1 = provider("B1", &other_group.endpoint(), 1);
    b1.group_id = Some("acct-b".to_string());
    // Make A1 the deterministic first pick among equals.
    let gateway = TestGateway::spawn(vec![a1, a2, b1], |config| {
        config.default_provider = Some("A1".to_string());
    })
    .await;

    let response = gateway.post_messages(&messages_body()).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();

    // After A1's failure the retry avoids its group-mate A2.
    assert_eq!(body["provider_used"], "B1");
    assert_eq!(same_group.hits(), 0);
    assert_eq!(other_group.hits(), 1);
}

#[tokio::test]
async fn auth_failures_are_not_retried() {
    let rejecting = StubUpstream::spawn(StubMode::Status {
        code: 401,
        delay_ms: 5,
    })
    .await;
    let healthy = StubUpstream::spawn(StubMode::Ok {
        text: "hi".to_string(),
        delay_ms: 5,
    })
    .await;

    let gateway = TestGateway::spawn(
        vec![
            provider("P1", &rejecting.endpoint(), 1),
            provider("P2", &healthy.endpoint(), 2),
        ],
        |_| {},
    )
    .await;

    // auth is persistent: surfaced on first occurrence, no failover.
    let response = gateway.post_messages(&messages_body()).await;
    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "authentication_error");

    assert_eq!(rejecting.hits(), 1);
    assert_eq!(healthy.hits(), 0);
}
