//! Scenarios 1 and 2: cold cache, then a cache hit.

use super::support::{messages_body, provider, StubMode, StubUpstream, TestGateway};

#[tokio::test]
async fn cold_cache_round_trip() {
    let stub = StubUpstream::spawn(StubMode::Ok {
        text: "hi".to_string(),
        delay_ms: 30,
    })
    .await;
    let gateway = TestGateway::spawn(vec![provider("P1", &stub.endpoint(), 1)], |_| {}).await;

    let response = gateway.post_messages(&messages_body()).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(body["content"][0]["text"], "hi");
    assert_eq!(body["usage"]["input_tokens"], 3);
    assert_eq!(body["usage"]["output_tokens"], 1);
    assert_eq!(body["provider_used"], "P1");

    let p1 = gateway.provider_metrics("P1").await;
    assert_eq!(p1["requests"], 1);
    assert_eq!(p1["successes"], 1);

    let metrics = gateway.metrics().await;
    assert_eq!(metrics["cache_store"]["misses"], 1);
    assert_eq!(metrics["cache_store"]["hits"], 0);
}

#[tokio::test]
async fn identical_request_is_served_from_cache() {
    let stub = StubUpstream::spawn(StubMode::Ok {
        text: "hi".to_string(),
        delay_ms: 30,
    })
    .await;
    let gateway = TestGateway::spawn(vec![provider("P1", &stub.endpoint(), 1)], |_| {}).await;

    let first = gateway.post_messages(&messages_body()).await;
    assert_eq!(first.status().as_u16(), 200);
    let first: serde_json::Value = first.json().await.unwrap();

    let second = gateway.post_messages(&messages_body()).await;
    assert_eq!(second.status().as_u16(), 200);
    let second: serde_json::Value = second.json().await.unwrap();

    assert_eq!(first["content"], second["content"]);
    assert_eq!(first["usage"], second["usage"]);

    // No second upstream call.
    assert_eq!(stub.hits(), 1);
    let p1 = gateway.provider_metrics("P1").await;
    assert_eq!(p1["requests"], 1);

    let metrics = gateway.metrics().await;
    assert_eq!(metrics["cache_store"]["hits"], 1);
}

#[tokio::test]
async fn streaming_requests_bypass_the_cache() {
    let stub = StubUpstream::spawn(StubMode::Ok {
        text: "hi".to_string(),
        delay_ms: 5,
    })
    .await;
    let gateway = TestGateway::spawn(vec![provider("P1", &stub.endpoint(), 1)], |_| {}).await;

    let mut body = messages_body();
    body["stream"] = serde_json::json!(true);

    let first = gateway.post_messages(&body).await;
    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(
        first.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let text = first.text().await.unwrap();
    assert!(text.contains("event: message_start"));
    assert!(text.contains("event: content_block_delta"));
    assert!(text.contains("event: message_delta"));
    assert!(text.contains("event: message_stop"));
    assert!(text.contains("\"text\":\"hi\""));

    // Second identical streaming request hits the upstream again: the
    // cache was neither read nor populated.
    let second = gateway.post_messages(&body).await;
    assert_eq!(second.status().as_u16(), 200);
    assert_eq!(stub.hits(), 2);
}
