//! Client for the upstream record provider.
//!
//! One work item may be listed under several provider symbols (one per
//! exchange suffix). [`UpstreamClient::fetch_record`] walks the candidates in
//! priority order and returns the first usable payload, retrying rate limits,
//! server errors and transport failures through the shared [`RetryPolicy`].
//!
//! Everything that knows the provider's JSON shape lives in [`map_payload`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde_json::{Map, Value};
use sheaf_core::config::{HttpConfig, ProviderConfig};
use sheaf_core::error::AppError;
use sheaf_core::models::{FailureKind, FetchFailure, FetchResult, Record};
use sheaf_core::retry::{RetryPolicy, StatusClass, parse_retry_after};
use sheaf_core::traits::RecordProvider;
use tokio::time::sleep;

// =============================================================================
// Candidate expansion
// =============================================================================

/// Provider symbols to try for `id`, in priority order.
///
/// - `id` already ends in `.{suffix}` for a configured suffix → `[id]`
/// - otherwise → `{id}.{suffix}` for each suffix
/// - no suffixes configured → `[id]`
pub fn candidate_symbols(id: &str, suffixes: &[String]) -> Vec<String> {
    if suffixes.is_empty() {
        return vec![id.to_string()];
    }
    let already_suffixed = suffixes.iter().any(|suffix| {
        id.len() > suffix.len() + 1
            && id.ends_with(suffix.as_str())
            && id[..id.len() - suffix.len()].ends_with('.')
    });
    if already_suffixed {
        return vec![id.to_string()];
    }
    suffixes
        .iter()
        .map(|suffix| format!("{}.{}", id, suffix))
        .collect()
}

// =============================================================================
// Payload mapping
// =============================================================================

const NAME_FIELDS: &[&str] = &["longName", "shortName", "name", "displayName"];
const CURRENCY_FIELDS: &[&str] = &["currency", "financialCurrency"];

/// Canonical metric names and the provider fields they can come from.
const METRIC_ALIASES: &[(&str, &[&str])] = &[
    ("price", &["regularMarketPrice", "lastPrice", "close"]),
    ("previousClose", &["regularMarketPreviousClose"]),
    ("volume", &["regularMarketVolume"]),
    ("marketCap", &["marketCapitalization"]),
    ("peRatio", &["trailingPE", "pe"]),
    ("dividendYield", &["trailingAnnualDividendYield"]),
];

/// Reads a number that is either plain or wrapped as `{"raw": n, "fmt": "..."}`.
fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(obj) => obj.get("raw").and_then(Value::as_f64),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| obj.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Maps one provider response to the canonical [`Record`].
///
/// `pointer` locates the record object (empty = response root); when it
/// lands on an array the first element is used. Every finite numeric field
/// becomes a metric, and the alias table fills in canonical names. Returns
/// `None` when the payload is missing or carries no numeric field, which the
/// caller treats as "no data for this candidate".
pub fn map_payload(
    id: &str,
    symbol: &str,
    body: &Value,
    pointer: &str,
    fetched_at: DateTime<Utc>,
) -> Option<Record> {
    let located = if pointer.is_empty() {
        body
    } else {
        body.pointer(pointer)?
    };
    let obj = match located {
        Value::Array(items) => items.first()?.as_object()?,
        other => other.as_object()?,
    };

    let mut metrics: BTreeMap<String, f64> = obj
        .iter()
        .filter_map(|(key, value)| numeric(value).map(|n| (key.clone(), n)))
        .collect();
    for (canonical, aliases) in METRIC_ALIASES {
        if metrics.contains_key(*canonical) {
            continue;
        }
        if let Some(n) = aliases.iter().find_map(|alias| obj.get(*alias).and_then(numeric)) {
            metrics.insert(canonical.to_string(), n);
        }
    }
    if metrics.is_empty() {
        return None;
    }

    Some(Record {
        id: id.to_string(),
        symbol: symbol.to_string(),
        name: first_string(obj, NAME_FIELDS),
        currency: first_string(obj, CURRENCY_FIELDS),
        metrics,
        fetched_at,
    })
}

// =============================================================================
// Client
// =============================================================================

/// Result of trying one candidate symbol.
#[derive(Debug)]
enum CandidateOutcome {
    Found(Record),
    /// Answered without a usable payload, or a permanent 4xx.
    NoData(String),
    /// Still rate-limited after the last retry.
    RateLimited(String),
    /// 5xx or transport failure after the last retry.
    Exception(String),
}

/// HTTP client for the upstream provider.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    config: ProviderConfig,
    api_key: Option<(HeaderName, HeaderValue)>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url)
            .field("suffixes", &self.config.suffixes)
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    /// Creates a new provider client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` for an invalid provider section or an
    /// API key header without a key, `AppError::InvalidUrl` if `base_url`
    /// does not parse, and `AppError::ClientError` if the HTTP client cannot
    /// be built.
    pub fn new(
        config: &ProviderConfig,
        api_key: Option<String>,
        http: &HttpConfig,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Url::parse(&config.base_url).map_err(|_| AppError::InvalidUrl(config.base_url.clone()))?;

        let api_key = match (&config.api_key_header, api_key) {
            (Some(header), Some(key)) => {
                let name = HeaderName::try_from(header.as_str()).map_err(|e| {
                    AppError::ConfigError(format!("invalid api_key_header '{}': {}", header, e))
                })?;
                let mut value = HeaderValue::try_from(key.as_str()).map_err(|e| {
                    AppError::ConfigError(format!("invalid PROVIDER_API_KEY: {}", e))
                })?;
                value.set_sensitive(true);
                Some((name, value))
            }
            (Some(header), None) => {
                return Err(AppError::ConfigError(format!(
                    "provider.api_key_header is '{}' but PROVIDER_API_KEY is not set",
                    header
                )));
            }
            (None, _) => None,
        };

        let client = Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout())
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            api_key,
            retry,
        })
    }

    pub fn candidates(&self, id: &str) -> Vec<String> {
        candidate_symbols(id, &self.config.suffixes)
    }

    fn candidate_url(&self, symbol: &str) -> Result<Url, AppError> {
        let encoded: String = url::form_urlencoded::byte_serialize(symbol.as_bytes()).collect();
        let path = self.config.path_template.replace("{symbol}", &encoded);
        let raw = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        Url::parse(&raw).map_err(|_| AppError::InvalidUrl(raw))
    }

    fn map_body(
        &self,
        id: &str,
        symbol: &str,
        bytes: &[u8],
        fetched_at: DateTime<Utc>,
    ) -> CandidateOutcome {
        let body: Value = match serde_json::from_slice(bytes) {
            Ok(body) => body,
            Err(e) => {
                return CandidateOutcome::NoData(format!("{}: invalid JSON: {}", symbol, e));
            }
        };
        match map_payload(id, symbol, &body, &self.config.payload_pointer, fetched_at) {
            Some(record) => CandidateOutcome::Found(record),
            None => CandidateOutcome::NoData(format!("{}: no usable payload", symbol)),
        }
    }

    /// Fetches one candidate, retrying 429, 5xx and transport errors.
    ///
    /// A 2xx whose body cannot be read counts as a transport error; a body
    /// that arrives but is not JSON counts as no data.
    async fn try_candidate(&self, id: &str, symbol: &str) -> CandidateOutcome {
        let url = match self.candidate_url(symbol) {
            Ok(url) => url,
            Err(e) => return CandidateOutcome::NoData(e.to_string()),
        };
        let mut attempt = 0u32;

        loop {
            let mut request = self.client.get(url.clone());
            if let Some((name, value)) = &self.api_key {
                request = request.header(name.clone(), value.clone());
            }

            let (outcome, retry_after) = match request.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    match StatusClass::of(status) {
                        StatusClass::Success => {
                            let fetched_at = Utc::now();
                            match resp.bytes().await {
                                Ok(bytes) => return self.map_body(id, symbol, &bytes, fetched_at),
                                Err(e) => (
                                    CandidateOutcome::Exception(format!(
                                        "{}: failed to read body: {}",
                                        symbol, e
                                    )),
                                    None,
                                ),
                            }
                        }
                        StatusClass::RateLimited => {
                            let hint = resp
                                .headers()
                                .get(reqwest::header::RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| parse_retry_after(v, Utc::now()));
                            (
                                CandidateOutcome::RateLimited(format!("{}: HTTP 429", symbol)),
                                hint,
                            )
                        }
                        StatusClass::Transient => (
                            CandidateOutcome::Exception(format!("{}: HTTP {}", symbol, status)),
                            None,
                        ),
                        StatusClass::Permanent => {
                            return CandidateOutcome::NoData(format!("{}: HTTP {}", symbol, status));
                        }
                    }
                }
                // Any transport failure is transient, including a reset connection.
                Err(e) => (
                    CandidateOutcome::Exception(format!("{}: {}", symbol, e)),
                    None,
                ),
            };

            if !self.retry.should_retry(attempt) {
                return outcome;
            }
            let delay = self.retry.delay_for(attempt, retry_after);
            tracing::debug!(
                id,
                symbol,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                outcome = ?outcome,
                "Provider request failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl RecordProvider for UpstreamClient {
    async fn fetch_record(&self, id: &str) -> FetchResult {
        let candidates = self.candidates(id);
        let mut kind = FailureKind::NoData;
        let mut messages = Vec::new();

        for (index, symbol) in candidates.iter().enumerate() {
            match self.try_candidate(id, symbol).await {
                CandidateOutcome::Found(record) => return Ok(record),
                CandidateOutcome::RateLimited(message) => {
                    tracing::warn!(id, symbol = %symbol, "Rate limit persisted past retries");
                    messages.push(message);
                    return Err(FetchFailure::new(id, FailureKind::RateLimited)
                        .with_candidates(candidates[..=index].to_vec())
                        .with_message(messages.join("; ")));
                }
                CandidateOutcome::Exception(message) => {
                    kind = kind.worst(FailureKind::Exception);
                    messages.push(message);
                }
                CandidateOutcome::NoData(message) => {
                    messages.push(message);
                }
            }
        }

        Err(FetchFailure::new(id, kind)
            .with_candidates(candidates)
            .with_message(messages.join("; ")))
    }
}
