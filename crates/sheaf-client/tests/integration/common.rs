//! Mock key-value store and provider served over HTTP.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use sheaf_core::config::{HttpConfig, ProviderConfig};
use sheaf_core::retry::RetryPolicy;
use sheaf_client::{KvRestClient, UpstreamClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";

/// Shared state behind the mock server.
#[derive(Clone, Default)]
pub struct MockState {
    pub values: Arc<Mutex<HashMap<String, String>>>,
    pub ttls: Arc<Mutex<HashMap<String, u64>>>,
    pub sets: Arc<Mutex<HashMap<String, BTreeSet<String>>>>,
    /// Statuses returned, in order, before the KV routes behave normally.
    pub kv_failures: Arc<Mutex<VecDeque<u16>>>,
    /// Scripted provider responses per symbol. The last one repeats.
    pub quotes: Arc<Mutex<HashMap<String, VecDeque<(u16, Value)>>>>,
    /// Every request path, in arrival order.
    pub hits: Arc<Mutex<Vec<String>>>,
    /// `x-api-key` header of every provider request.
    pub api_keys: Arc<Mutex<Vec<Option<String>>>>,
    /// `Retry-After` sent with every 429. Defaults to `"0"`.
    pub retry_after: Arc<Mutex<Option<String>>>,
}

#[allow(dead_code)]
impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_kv(&self, statuses: &[u16]) {
        self.kv_failures.lock().unwrap().extend(statuses);
    }

    pub fn script_quote(&self, symbol: &str, responses: Vec<(u16, Value)>) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), responses.into());
    }

    pub fn set_retry_after(&self, value: &str) {
        *self.retry_after.lock().unwrap() = Some(value.to_string());
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hits_for(&self, prefix: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|path| path.starts_with(prefix))
            .count()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.ttls.lock().unwrap().get(key).copied()
    }
}

fn envelope(state: &MockState, status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = state
            .retry_after
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "0".to_string());
        return (status, [(header::RETRY_AFTER, retry_after)], Json(body)).into_response();
    }
    (status, Json(body)).into_response()
}

/// Authorizes the request and applies injected failures.
fn kv_guard(state: &MockState, headers: &HeaderMap, path: String) -> Option<Response> {
    state.hits.lock().unwrap().push(path);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    if !authorized {
        return Some(envelope(state, 401, json!({"error": "unauthorized"})));
    }
    let injected = state.kv_failures.lock().unwrap().pop_front();
    injected.map(|status| envelope(state, status, json!({"error": "injected"})))
}

async fn kv_get(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    if let Some(resp) = kv_guard(&state, &headers, format!("/get/{key}")) {
        return resp;
    }
    let value = state.values.lock().unwrap().get(&key).cloned();
    Json(json!({ "result": value })).into_response()
}

async fn kv_set(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    if let Some(resp) = kv_guard(&state, &headers, format!("/set/{key}")) {
        return resp;
    }
    match params.get("EX").and_then(|ex| ex.parse::<u64>().ok()) {
        Some(ex) => {
            state.ttls.lock().unwrap().insert(key.clone(), ex);
        }
        None => {
            state.ttls.lock().unwrap().remove(&key);
        }
    }
    state.values.lock().unwrap().insert(key, body);
    Json(json!({ "result": "OK" })).into_response()
}

async fn kv_sadd(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path((key, member)): Path<(String, String)>,
) -> Response {
    if let Some(resp) = kv_guard(&state, &headers, format!("/sadd/{key}/{member}")) {
        return resp;
    }
    let added = state
        .sets
        .lock()
        .unwrap()
        .entry(key)
        .or_default()
        .insert(member);
    Json(json!({ "result": if added { 1 } else { 0 } })).into_response()
}

async fn quote(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(symbol): Path<String>,
) -> Response {
    state.hits.lock().unwrap().push(format!("/v1/quote/{symbol}"));
    state.api_keys.lock().unwrap().push(
        headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let mut quotes = state.quotes.lock().unwrap();
    let next = quotes.get_mut(&symbol).and_then(|queue| {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    });
    drop(quotes);
    match next {
        Some((status, body)) => envelope(&state, status, body),
        None => envelope(&state, 404, json!({"error": "unknown symbol"})),
    }
}

/// Starts the mock server and returns its base URL.
pub async fn spawn(state: MockState) -> String {
    let app = Router::new()
        .route("/get/:key", get(kv_get))
        .route("/set/:key", post(kv_set))
        .route("/sadd/:key/:member", get(kv_sadd))
        .route("/v1/quote/:symbol", get(quote))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// How the raw server treats one connection.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum RawReply {
    /// Read the request, then close without answering.
    Drop,
    /// Send 200 headers, half the body, then close.
    Truncated,
    /// Send a complete 200 response.
    Full,
}

/// Starts a bare TCP server that answers every path with `body`, treating
/// connections according to `replies` (the last one repeats).
///
/// Returns the base URL and a counter of accepted connections.
#[allow(dead_code)]
pub async fn spawn_raw(replies: Vec<RawReply>, body: &str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let body = body.to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let reply = replies[index.min(replies.len() - 1)];

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            let sent = match reply {
                RawReply::Drop => continue,
                RawReply::Truncated => format!("{head}{}", &body[..body.len() / 2]),
                RawReply::Full => format!("{head}{body}"),
            };
            let _ = socket.write_all(sent.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}"), connections)
}

#[allow(dead_code)]
pub fn kv_client(base_url: &str, retries: u32) -> KvRestClient {
    KvRestClient::new(
        base_url,
        TOKEN,
        &HttpConfig::default(),
        RetryPolicy::immediate(retries),
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn provider_config(base_url: &str, suffixes: &[&str]) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn upstream_client(config: &ProviderConfig, retries: u32) -> UpstreamClient {
    UpstreamClient::new(
        config,
        None,
        &HttpConfig::default(),
        RetryPolicy::immediate(retries),
    )
    .unwrap()
}

/// A minimal provider payload with one price.
#[allow(dead_code)]
pub fn quote_body(name: &str, price: f64) -> Value {
    json!({ "shortName": name, "currency": "USD", "regularMarketPrice": price })
}
