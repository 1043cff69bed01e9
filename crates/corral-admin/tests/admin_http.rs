// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corral_admin::AppState;
use corral_drain::{Connector, Drainer, Registry};
use corral_filter::{Device, DeviceMetadata, FilterGate, FilterSet, FilterValue, MetadataValue};
use tokio::net::TcpListener;

struct NoMetadata;
impl DeviceMetadata for NoMetadata {
    fn load(&self, _key: &str) -> Option<MetadataValue> {
        None
    }
    fn claims(&self) -> HashMap<String, MetadataValue> {
        HashMap::new()
    }
}

struct FakeDevice {
    id: String,
}
impl Device for FakeDevice {
    fn id(&self) -> &str {
        &self.id
    }
    fn metadata(&self) -> &dyn DeviceMetadata {
        &NoMetadata
    }
}

struct FakeRegistry {
    count: usize,
}
impl Registry for FakeRegistry {
    fn len(&self) -> usize {
        self.count
    }
    fn visit_all(&self, visitor: &mut dyn FnMut(&dyn Device) -> bool) -> usize {
        let mut n = 0;
        for i in 0..self.count {
            let device = FakeDevice { id: i.to_string() };
            n += 1;
            if !visitor(&device) {
                break;
            }
        }
        n
    }
}

struct CountingConnector {
    disconnected: AtomicUsize,
}
impl Connector for CountingConnector {
    fn disconnect(&self, _device_id: &str) -> bool {
        self.disconnected.fetch_add(1, Ordering::Relaxed);
        true
    }
}

async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let app = corral_admin::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

/// S3 — PUT a new filter returns 201, the identical request repeated
/// returns 200, and the gate reflects exactly that one entry.
#[tokio::test]
async fn s3_admin_add_then_repeat() {
    let state = AppState {
        gate: Arc::new(FilterGate::new()),
        drainer: Drainer::new(
            Arc::new(FakeRegistry { count: 0 }),
            Arc::new(CountingConnector { disconnected: AtomicUsize::new(0) }),
        ),
    };
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/filters");
    let body = serde_json::json!({"key": "partner-id", "values": ["comcast", "sky"]});

    let first = client.put(&url).json(&body).send().await.unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::CREATED);
    let wire: serde_json::Value = first.json().await.unwrap();
    assert_eq!(wire["filters"].as_object().unwrap().len(), 1);

    let second = client.put(&url).json(&body).send().await.unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::OK);
}

/// S4 — a restricted allow-list rejects a disallowed key with 400 and
/// leaves the store untouched.
#[tokio::test]
async fn s4_rejected_add_leaves_store_untouched() {
    let gate = Arc::new(FilterGate::with_allowed_filters(FilterSet::new([FilterValue::String(
        "partner-id".to_string(),
    )])));
    let state = AppState {
        gate: Arc::clone(&gate),
        drainer: Drainer::new(
            Arc::new(FakeRegistry { count: 0 }),
            Arc::new(CountingConnector { disconnected: AtomicUsize::new(0) }),
        ),
    };
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/filters"))
        .json(&serde_json::json!({"key": "region", "values": ["eu"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(gate.get_filter("region").is_none());
}

/// S5 (scaled down for test speed) — a drain job runs to completion and
/// the final status reports every device visited and drained.
#[tokio::test]
async fn s5_drain_to_completion() {
    let state = AppState {
        gate: Arc::new(FilterGate::new()),
        drainer: Drainer::new(
            Arc::new(FakeRegistry { count: 237 }),
            Arc::new(CountingConnector { disconnected: AtomicUsize::new(0) }),
        ),
    };
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();

    let start = client
        .post(format!("http://{addr}/drain?rate=50&tick=5ms"))
        .send()
        .await
        .unwrap();
    assert_eq!(start.status(), reqwest::StatusCode::OK);
    let job: serde_json::Value = start.json().await.unwrap();
    assert_eq!(job["count"], 237);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let final_status = loop {
        let status: serde_json::Value = client
            .get(format!("http://{addr}/drain"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if status["active"] == false {
            break status;
        }
        assert!(tokio::time::Instant::now() < deadline, "drain did not finish in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(final_status["progress"]["visited"], 237);
    assert_eq!(final_status["progress"]["drained"], 237);
    assert!(final_status["progress"]["finished"].is_string());
}

/// S6 (scaled down) — cancelling mid-flight stops the job and a second
/// cancel reports the not-active conflict.
#[tokio::test]
async fn s6_drain_cancel_mid_flight() {
    let state = AppState {
        gate: Arc::new(FilterGate::new()),
        drainer: Drainer::new(
            Arc::new(FakeRegistry { count: 1_000_000 }),
            Arc::new(CountingConnector { disconnected: AtomicUsize::new(0) }),
        ),
    };
    let addr = spawn_server(state).await;
    let client = reqwest::Client::new();

    let start = client.post(format!("http://{addr}/drain")).send().await.unwrap();
    assert_eq!(start.status(), reqwest::StatusCode::OK);

    let cancel = client.delete(format!("http://{addr}/drain")).send().await.unwrap();
    assert_eq!(cancel.status(), reqwest::StatusCode::OK);

    let status: serde_json::Value = client
        .get(format!("http://{addr}/drain"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["active"], false);
    assert!(status["progress"]["visited"].as_u64().unwrap() <= 1_000_000);

    let second_cancel = client.delete(format!("http://{addr}/drain")).send().await.unwrap();
    assert_eq!(second_cancel.status(), reqwest::StatusCode::CONFLICT);
}
