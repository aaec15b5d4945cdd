//! Test server wiring.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use sheaf_client::{KvStoreEnum, UpstreamClient};
use sheaf_core::{
    HarvestConfig, HarvestService, HttpConfig, MemoryStore, ProviderConfig, RetryPolicy,
    UniverseConfig,
};
use sheaf_server::{AppState, ServerConfig, create_router};

pub const ADMIN_TOKEN: &str = "admin-secret";

/// Symbols the mock provider answers with 429.
pub type Throttled = Arc<Mutex<HashSet<String>>>;

async fn quote(State(throttled): State<Throttled>, Path(symbol): Path<String>) -> Response {
    if throttled.lock().unwrap().contains(&symbol) {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    Json(json!({ "shortName": symbol, "regularMarketPrice": 1.5 })).into_response()
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A running server and handles into its state.
pub struct TestServer {
    pub base_url: String,
    pub store: MemoryStore,
    pub throttled: Throttled,
    pub shutdown_token: CancellationToken,
    pub client: reqwest::Client,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn invoke(&self, query: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/v1/invoke{query}")))
            .bearer_auth(ADMIN_TOKEN)
            .send()
            .await
            .unwrap()
    }

    pub async fn get_json(&self, path: &str) -> (StatusCode, serde_json::Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }
}

/// Starts a server over `items` with batch size 2.
pub async fn start(items: &[&str], admin_token: Option<&str>) -> TestServer {
    let throttled: Throttled = Arc::default();
    let provider_url = serve(
        Router::new()
            .route("/v1/quote/:symbol", get(quote))
            .with_state(throttled.clone()),
    )
    .await;

    let store = MemoryStore::new();
    let upstream = UpstreamClient::new(
        &ProviderConfig {
            base_url: provider_url,
            ..Default::default()
        },
        None,
        &HttpConfig::default(),
        RetryPolicy::immediate(0),
    )
    .unwrap();
    let service = HarvestService::with_config(
        KvStoreEnum::Memory(store.clone()),
        upstream,
        HarvestConfig {
            batch_size: 2,
            concurrency: 2,
            ..Default::default()
        },
    );

    let shutdown_token = CancellationToken::new();
    let state = AppState::new(
        service,
        UniverseConfig {
            items: items.iter().map(|s| s.to_string()).collect(),
            path: None,
        },
        admin_token.map(str::to_string),
        shutdown_token.clone(),
    );
    let config = ServerConfig::parse_from(["sheaf-server", "--memory-store"]);
    let base_url = serve(create_router(state, &config)).await;

    TestServer {
        base_url,
        store,
        throttled,
        shutdown_token,
        client: reqwest::Client::new(),
    }
}
