use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use cloudwatcher_infra::{AppConfig, StorageProvider};

struct TestServer {
    base_url: String,
    ws_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory storage, ephemeral port.
        let mut config = AppConfig::default();
        config.storage.provider = StorageProvider::Memory;
        config.retry.initial_delay_ms = 1;
        config.retry.max_delay_ms = 5;

        let services = cloudwatcher_api::app::services::build_services(&config).unwrap();
        let app = cloudwatcher_api::app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}"),
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn socket_health(client: &reqwest::Client, base_url: &str) -> Value {
    client
        .get(format!("{base_url}/ws/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for_connections(client: &reqwest::Client, base_url: &str, expected: u64) -> Value {
    // Registration happens on the server's upgrade task; poll briefly.
    for _ in 0..100 {
        let body = socket_health(client, base_url).await;
        if body["total_connections"].as_u64() == Some(expected) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection count never reached {expected}");
}

#[tokio::test]
async fn health_endpoints_respond() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/health/storage", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["provider"], "memory");

    let body = socket_health(&client, &srv.base_url).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["total_connections"], 0);
    assert_eq!(body["device_ids"], json!([]));
}

#[tokio::test]
async fn request_lifecycle_upload_fetch_list_delete() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v2/requests/truck-001/req-001", srv.base_url);
    let request = json!({
        "request_id": "req-001",
        "device_id": "truck-001",
        "request_type": "inventory_sync",
        "payload": {"items": [1, 2]},
        "version": "1.0"
    });

    let res = client.post(&url).json(&request).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt: Value = res.json().await.unwrap();
    assert_eq!(receipt["path"], "/Cloud/Requests/truck-001/req-001.json");

    let fetched: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(fetched, request);

    let listed: Value = client
        .get(format!("{}/api/v2/requests/truck-001", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "req-001.json");

    let res = client.delete(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn uploaded_payloads_come_back_unchanged() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let request = json!({
        "request_id": "req-002",
        "orderId": 7,
        "items": [1, 2],
        "version": "1.0"
    });
    let url = format!("{}/api/v2/requests/truck-001/req-002", srv.base_url);
    let res = client.post(&url).json(&request).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let fetched: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(fetched, request);

    let response = json!({
        "status": "completed",
        "data": {"rows": 3},
        "region": "eu-west",
        "version": "1.0"
    });
    let url = format!("{}/api/v2/responses/truck-001/req-002", srv.base_url);
    let res = client.post(&url).json(&response).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let fetched: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(fetched, response);
}

#[tokio::test]
async fn payloads_of_the_wrong_shape_are_rejected_before_storage() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v2/requests/truck-001/req-003", srv.base_url);

    for body in [json!([1, 2, 3]), json!({"request_id": 5}), json!("text")] {
        let res = client.post(&url).json(&body).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body {body}");
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error");
    }

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_input_is_rejected_with_400() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/v2/requests/truck-001/req-001", srv.base_url))
        .json(&Value::Null)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("cannot be null"));

    let res = client
        .post(format!("{}/api/v2/requests/truck-001/req-001/status", srv.base_url))
        .json(&json!({"status": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{}/api/v2/responses/truck-001?pattern=%5B", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn device_socket_receives_notifications() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (mut socket, _) = connect_async(format!("{}/ws/devices/truck-001", srv.ws_url))
        .await
        .expect("websocket handshake");
    let health = wait_for_connections(&client, &srv.base_url, 1).await;
    assert_eq!(health["device_ids"], json!(["truck-001"]));

    let res = client
        .post(format!("{}/api/v2/requests/truck-001/req-001/status", srv.base_url))
        .json(&json!({"status": "processing", "details": {"progress": 50}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["delivered"], 1);

    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("notification in time")
        .expect("socket open")
        .expect("valid frame");
    let msg: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(msg["type"], "request_update");
    assert_eq!(msg["requestId"], "req-001");
    assert_eq!(msg["status"], "processing");
    assert_eq!(msg["data"]["progress"], 50);

    let res = client
        .post(format!("{}/api/v2/responses/truck-001/req-001", srv.base_url))
        .json(&json!({"request_id": "req-001", "status": "completed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("notification in time")
        .expect("socket open")
        .expect("valid frame");
    let msg: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(msg["type"], "response_ready");
    assert_eq!(msg["data"]["status"], "completed");

    socket.send(Message::Close(None)).await.unwrap();
    wait_for_connections(&client, &srv.base_url, 0).await;
}

#[tokio::test]
async fn status_updates_succeed_without_listeners() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/v2/requests/truck-404/req-001/status", srv.base_url))
        .json(&json!({"status": "queued"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["delivered"], 0);
}
