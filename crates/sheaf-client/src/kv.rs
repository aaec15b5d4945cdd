//! Client for a key-value store exposed over a REST API.
//!
//! Speaks the Upstash-style command-per-path protocol:
//!
//! ```text
//! GET  {base}/get/{key}                 → {"result": "<value>" | null}
//! POST {base}/set/{key}[?EX=<seconds>]  body = value → {"result": "OK"}
//! GET  {base}/sadd/{key}/{member}       → {"result": 1 | 0}
//! ```
//!
//! Errors come back as `{"error": "..."}`. Every request carries a bearer
//! token and goes through the shared [`RetryPolicy`].

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::Value;
use sheaf_core::config::HttpConfig;
use sheaf_core::error::AppError;
use sheaf_core::retry::{RetryPolicy, StatusClass, parse_retry_after};
use sheaf_core::traits::KvStore;
use tokio::time::sleep;

/// Response envelope shared by every command.
#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the key-value REST store.
#[derive(Clone)]
pub struct KvRestClient {
    client: Client,
    base_url: Url,
    token: String,
    retry: RetryPolicy,
    timeout_secs: u64,
}

impl std::fmt::Debug for KvRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvRestClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl KvRestClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the token is empty,
    /// `AppError::InvalidUrl` if the URL cannot be parsed or cannot carry
    /// path segments, and `AppError::ClientError` if the HTTP client cannot
    /// be built.
    pub fn new(
        base_url: &str,
        token: &str,
        http: &HttpConfig,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::ConfigError("KV_REST_TOKEN is empty".to_string()));
        }
        let base_url =
            Url::parse(base_url).map_err(|_| AppError::InvalidUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout())
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
            retry,
            timeout_secs: http.timeout_secs,
        })
    }

    /// `{base}/{command}/{args...}` with each argument percent-encoded.
    fn command_url(&self, command: &str, args: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push(command);
            for arg in args {
                segments.push(arg);
            }
        }
        Ok(url)
    }

    /// Sends a command and returns the `result` field.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&str>,
    ) -> Result<Value, AppError> {
        let mut attempt = 0u32;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&self.token);
            if let Some(body) = body {
                request = request.body(body.to_string());
            }

            let (error, retry_after) = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    match StatusClass::of(status.as_u16()) {
                        StatusClass::Success => match resp.bytes().await {
                            Ok(bytes) => {
                                let envelope: Envelope =
                                    serde_json::from_slice(&bytes).map_err(|e| {
                                        AppError::StoreError(format!("malformed response: {}", e))
                                    })?;
                                return match envelope.error {
                                    Some(message) => Err(AppError::StoreError(message)),
                                    None => Ok(envelope.result),
                                };
                            }
                            Err(e) if e.is_timeout() => {
                                (AppError::Timeout(self.timeout_secs), None)
                            }
                            Err(e) => (
                                AppError::NetworkError(format!("Failed to read response: {}", e)),
                                None,
                            ),
                        },
                        StatusClass::RateLimited => {
                            let hint = resp
                                .headers()
                                .get(reqwest::header::RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| parse_retry_after(v, Utc::now()));
                            (AppError::RateLimitExceeded, hint)
                        }
                        StatusClass::Transient => (
                            AppError::StoreError(format!("Server error: HTTP {}", status.as_u16())),
                            None,
                        ),
                        StatusClass::Permanent => {
                            let message = resp
                                .json::<Envelope>()
                                .await
                                .ok()
                                .and_then(|e| e.error)
                                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
                            return Err(AppError::StoreError(message));
                        }
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        (AppError::Timeout(self.timeout_secs), None)
                    } else if e.is_connect() {
                        (
                            AppError::NetworkError(format!("Connection failed: {}", e)),
                            None,
                        )
                    } else {
                        (AppError::NetworkError(format!("Request failed: {}", e)), None)
                    }
                }
            };

            if !self.retry.should_retry(attempt) {
                return Err(error);
            }
            let delay = self.retry.delay_for(attempt, retry_after);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = self.retry.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "KV request failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl KvStore for KvRestClient {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let url = self.command_url("get", &[key])?;
        match self.execute(Method::GET, url, None).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let mut url = self.command_url("set", &[key])?;
        if let Some(ttl) = ttl {
            url.query_pairs_mut()
                .append_pair("EX", &ttl.as_secs().max(1).to_string());
        }
        match self.execute(Method::POST, url, Some(value)).await? {
            Value::String(s) if s == "OK" => Ok(()),
            other => Err(AppError::StoreError(format!(
                "unexpected SET result: {}",
                other
            ))),
        }
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, AppError> {
        let url = self.command_url("sadd", &[key, member])?;
        let result = self.execute(Method::GET, url, None).await?;
        result.as_i64().map(|added| added > 0).ok_or_else(|| {
            AppError::StoreError(format!("unexpected SADD result: {}", result))
        })
    }
}
