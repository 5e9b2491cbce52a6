//! End-to-end tests against a real listener.

use std::net::SocketAddr;

use chainkey_key_registry::KeyRegistry;
use chainkey_rpc::{bind_listener, serve, AppState, RpcConfig};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = bind_listener("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = AppState::new(KeyRegistry::new());

        let handle = tokio::spawn(async move {
            let config = RpcConfig::default();
            serve(listener, state, &config, async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        Self {
            addr,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap()
    }
}

#[tokio::test]
async fn generate_then_lookup_over_http() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/generate-key"))
        .json(&json!({ "address": "0xABC", "chainName": "testnet" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let key = body["uniqueKey"].as_str().unwrap().to_string();
    assert_eq!(key.len(), 64);

    let response = client
        .get(server.url(&format!("/get-details/{key}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["uniqueKey"], key.as_str());
    assert_eq!(body["mapping"]["address"], "0xABC");
    assert_eq!(body["mapping"]["chainName"], "testnet");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn missing_and_unknown_over_http() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/generate-key"))
        .json(&json!({ "address": "0xABC" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Address and chainName are required.");

    let response = client
        .get(server.url("/get-details/nonexistent-key"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_body_is_generic_failure_over_http() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/generate-key"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{bad")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Something went wrong!");

    let response = client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_stops_server_cleanly() {
    let server = TestServer::start().await;
    let health = reqwest::get(server.url("/health")).await.unwrap();
    assert!(health.status().is_success());

    server.stop().await.unwrap();
}
