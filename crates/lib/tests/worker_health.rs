//! Integration test: start the health endpoint on a free port, GET /health, assert status JSON,
//! then stop it through its watch channel. Does not require a broker.

use std::sync::Arc;
use std::time::Duration;

use relay::health;
use relay::worker::WorkerStats;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

#[tokio::test]
async fn health_http_reports_topic_and_counters() {
    let port = free_port();
    let addr = format!("127.0.0.1:{}", port);
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let server = health::spawn_health(
        &addr,
        "persistent://public/default/completions".to_string(),
        Arc::new(WorkerStats::default()),
        stop_rx,
    )
    .await
    .expect("health endpoint starts");

    let url = format!("http://{}/health", addr);
    let client = reqwest::Client::new();
    let mut last_err = None;
    let mut body = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                body = Some(resp.json::<serde_json::Value>().await.expect("parse JSON"));
                break;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let json = body.unwrap_or_else(|| {
        panic!(
            "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
            url, last_err
        )
    });
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(
        json.get("topic").and_then(|v| v.as_str()),
        Some("persistent://public/default/completions")
    );
    for counter in ["received", "delivered", "failed", "acknowledged"] {
        assert_eq!(json.get(counter).and_then(|v| v.as_u64()), Some(0), "{}", counter);
    }

    drop(client);
    stop_tx.send(true).expect("server still listening for stop");
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("health endpoint stops within 5s")
        .expect("health task did not panic");
}

#[tokio::test]
async fn health_bind_conflict_is_an_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").expect("bind port");
    let addr = taken.local_addr().expect("local_addr").to_string();
    let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);

    let result =
        health::spawn_health(&addr, "jobs".to_string(), Arc::new(WorkerStats::default()), stop_rx)
            .await;
    assert!(result.is_err());
}
