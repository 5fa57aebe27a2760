//! End-to-end tests against the ingestion & query API: a real `SqliteStore`
//! backed by a temp file, a real axum router, driven over a loopback TCP
//! socket with `reqwest`.

use std::net::SocketAddr;
use std::sync::Arc;

use argos::api::{router, ApiState};
use argos::shared::model::{AlertRuleInput, Batch, Sample, Severity};
use argos::storage::SqliteStore;
use chrono::Utc;
use serde_json::json;
use tempfile::tempdir;

async fn spawn_test_api() -> (SocketAddr, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("argos.db");
    let store = SqliteStore::new(&db_path).await.unwrap();
    let state = ApiState::new(Arc::new(store));

    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, dir)
}

#[tokio::test]
async fn ingest_then_query_latest_round_trips() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let batch = Batch {
        agent_id: "agent-1".to_string(),
        items: vec![Sample {
            service: "web".into(),
            target: "edge-1".into(),
            name: "http_up".into(),
            value: 1.0,
            labels: Default::default(),
            ts: Utc::now(),
        }],
    };

    let resp = client
        .post(format!("http://{addr}/ingest"))
        .json(&batch)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let resp = client
        .get(format!("http://{addr}/api/metrics/query"))
        .query(&[("name", "http_up"), ("service", "web"), ("target", "edge-1")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let sample: Sample = resp.json().await.unwrap();
    assert_eq!(sample.value, 1.0);
}

#[tokio::test]
async fn query_latest_with_duration_returns_a_range_response() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let batch = Batch {
        agent_id: "agent-1".to_string(),
        items: vec![Sample {
            service: "web".into(),
            target: "edge-1".into(),
            name: "http_up".into(),
            value: 1.0,
            labels: Default::default(),
            ts: Utc::now(),
        }],
    };
    client
        .post(format!("http://{addr}/ingest"))
        .json(&batch)
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("http://{addr}/api/metrics/query"))
        .query(&[("name", "http_up"), ("duration", "1h")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: argos::shared::model::QueryRangeResponse = resp.json().await.unwrap();
    assert_eq!(body.name, "http_up");
    assert_eq!(body.data.len(), 1);
    assert_eq!(body.data[0].value, 1.0);
}

#[tokio::test]
async fn query_latest_with_malformed_duration_is_400() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/metrics/query"))
        .query(&[("name", "http_up"), ("duration", "not-a-duration")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn ingest_with_malformed_json_shape_is_400() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/ingest"))
        .json(&json!({ "agent_id": 123, "items": "not-a-list" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn ingest_rejects_empty_batch() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/ingest"))
        .json(&json!({ "agent_id": "agent-1", "items": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn query_latest_with_no_data_is_404() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/metrics/query"))
        .query(&[("name", "nonexistent")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn health_is_degraded_before_first_ingest() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn alert_rule_crud_round_trips() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let input = AlertRuleInput {
        name: "high-cpu".into(),
        description: "cpu too hot".into(),
        expr: "avg_over(5m, cpu_pct) > 90".into(),
        service: Some("web".into()),
        target: None,
        for_duration: None,
        severity: Some(Severity::Critical),
        email_to: vec!["oncall@example.com".into()],
        enabled: None,
    };

    let resp = client
        .post(format!("http://{addr}/api/alert-rules"))
        .json(&input)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let created: argos::shared::model::AlertRule = resp.json().await.unwrap();
    assert!(created.enabled);
    assert_eq!(created.for_duration, "1m");

    let resp = client
        .get(format!("http://{addr}/api/alert-rules/{}", created.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("http://{addr}/api/alert-rules/{}", created.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("http://{addr}/api/alert-rules/{}", created.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn duplicate_alert_rule_name_is_409() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let input = AlertRuleInput {
        name: "dup".into(),
        description: String::new(),
        expr: "last(1m, db_up) == 0".into(),
        service: None,
        target: None,
        for_duration: None,
        severity: None,
        email_to: vec!["oncall@example.com".into()],
        enabled: None,
    };

    let resp = client
        .post(format!("http://{addr}/api/alert-rules"))
        .json(&input)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("http://{addr}/api/alert-rules"))
        .json(&input)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn create_alert_rule_requires_recipient() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/alert-rules"))
        .json(&json!({
            "name": "no-recipient",
            "expr": "last(1m, http_up) == 0",
            "email_to": []
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn active_alerts_starts_empty() {
    let (addr, _dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/alerts/active"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 0);
}
