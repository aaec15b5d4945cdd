//! Configuration types for sheaf components.
//!
//! Settings come from three layers, lowest precedence first:
//! built-in defaults, `sheaf.toml`, then `SHEAF_*` environment variables for
//! the few knobs operators tune per deployment. Credentials (the KV token
//! and the provider API key) are never read from the file; the binaries take
//! them from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::retry::RetryPolicy;
use crate::storage::DEFAULT_KEY_PREFIX;

// =============================================================================
// Harvest Configuration
// =============================================================================

/// Batch slicing and commit thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Work items per invocation.
    pub batch_size: usize,
    /// Concurrent fetches inside one batch.
    pub concurrency: usize,
    /// A batch whose failure ratio is strictly above this value is rejected.
    pub max_failure_ratio: f64,
    /// TTL of batch status records, in seconds.
    pub status_ttl_secs: u64,
    /// Optional TTL of committed batch records. `None` keeps them until overwritten.
    pub batch_ttl_secs: Option<u64>,
    /// Prefix shared by every key this harvester writes.
    pub key_prefix: String,
    /// Stay idle for the rest of the day once today's cycle is merged.
    pub one_cycle_per_day: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 5,
            max_failure_ratio: 0.8,
            status_ttl_secs: 3600,
            batch_ttl_secs: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            one_cycle_per_day: true,
        }
    }
}

impl HarvestConfig {
    /// Applies `SHEAF_BATCH_SIZE`, `SHEAF_CONCURRENCY` and
    /// `SHEAF_MAX_FAILURE_RATIO` on top of the current values.
    ///
    /// Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("SHEAF_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_parse("SHEAF_CONCURRENCY") {
            self.concurrency = v;
        }
        if let Some(v) = env_parse("SHEAF_MAX_FAILURE_RATIO") {
            self.max_failure_ratio = v;
        }
        self
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn batch_ttl(&self) -> Option<Duration> {
        self.batch_ttl_secs.map(Duration::from_secs)
    }

    /// Rejects values the harvester cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.batch_size == 0 {
            return Err(AppError::ConfigError(
                "harvest.batch_size must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AppError::ConfigError(
                "harvest.concurrency must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_failure_ratio) {
            return Err(AppError::ConfigError(format!(
                "harvest.max_failure_ratio must be within [0, 1], got {}",
                self.max_failure_ratio
            )));
        }
        if self.key_prefix.trim().is_empty() {
            return Err(AppError::ConfigError(
                "harvest.key_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// =============================================================================
// HTTP Configuration
// =============================================================================

/// HTTP client configuration for external API calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Hard timeout applied to every request, in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: concat!("sheaf/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Upstream provider endpoint description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Path appended to `base_url`. `{symbol}` is replaced by the candidate.
    pub path_template: String,
    /// Suffixes tried in priority order as `{id}.{suffix}`.
    pub suffixes: Vec<String>,
    /// JSON pointer to the object holding the record fields. Empty means the
    /// response root.
    pub payload_pointer: String,
    /// Header carrying the API key, when the provider needs one.
    pub api_key_header: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path_template: "/v1/quote/{symbol}".to_string(),
            suffixes: Vec::new(),
            payload_pointer: String::new(),
            api_key_header: None,
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::ConfigError(
                "provider.base_url is not set".to_string(),
            ));
        }
        if !self.path_template.contains("{symbol}") {
            return Err(AppError::ConfigError(format!(
                "provider.path_template must contain {{symbol}}, got '{}'",
                self.path_template
            )));
        }
        if !self.payload_pointer.is_empty() && !self.payload_pointer.starts_with('/') {
            return Err(AppError::ConfigError(format!(
                "provider.payload_pointer must be empty or start with '/', got '{}'",
                self.payload_pointer
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Universe Configuration
// =============================================================================

/// Where the ordered work-item universe comes from.
///
/// Exactly one of `items` or `path` should be set. A `path` is re-read on
/// every invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Inline identifiers.
    pub items: Vec<String>,
    /// File with one identifier per line. Relative paths resolve against the
    /// directory of the config file.
    pub path: Option<PathBuf>,
}

// =============================================================================
// Root Configuration (sheaf.toml)
// =============================================================================

/// Root configuration structure for sheaf.toml.
///
/// # Example
///
/// ```toml
/// [harvest]
/// batch_size = 50
/// concurrency = 5
///
/// [provider]
/// base_url = "https://api.example.com"
/// path_template = "/v1/quote/{symbol}"
/// suffixes = ["US", "L"]
///
/// [universe]
/// path = "universe.txt"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheafConfig {
    pub harvest: HarvestConfig,
    pub retry: RetryPolicy,
    pub http: HttpConfig,
    pub provider: ProviderConfig,
    pub universe: UniverseConfig,
}

impl SheafConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        self.harvest.validate()?;
        self.provider.validate()
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "sheaf.toml";

/// Returns the default configuration directory path.
///
/// Uses XDG Base Directory specification: `~/.config/sheaf/`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sheaf"))
}

/// Returns the default configuration file path.
///
/// Path: `~/.config/sheaf/sheaf.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

/// Default template content for a new sheaf.toml file.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# sheaf configuration
#
# Usage:
#   sheaf invoke            # Process the next batch (or merge at cycle end)
#   sheaf status            # Show the checkpoint and the last batch
#   sheaf run --interval-secs 300
#
# Credentials come from the environment:
#   KV_REST_URL, KV_REST_TOKEN, PROVIDER_API_KEY

[harvest]
batch_size = 50
concurrency = 5
max_failure_ratio = 0.8
status_ttl_secs = 3600
key_prefix = "harvest"
one_cycle_per_day = true

[retry]
max_retries = 4
base_delay_ms = 500
max_delay_ms = 30000
jitter_ms = 250

[http]
timeout_secs = 10

[provider]
base_url = "https://api.example.com"
path_template = "/v1/quote/{symbol}"
# Tried in order as "{id}.{suffix}" unless the id already ends in one.
suffixes = []
# JSON pointer to the record object inside the response ("" = root).
payload_pointer = ""
# api_key_header = "X-API-Key"

[universe]
# Inline list, or a file with one identifier per line.
items = ["AAPL", "MSFT", "GOOG"]
# path = "universe.txt"
"#;

/// Load the sheaf configuration from a TOML file.
///
/// # Arguments
/// * `path` - Optional custom path. If `None`, uses default XDG path.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No configuration file found and none could be created
/// * `Err(e)` - Configuration file exists but is invalid
///
/// # Behavior
/// If no configuration file exists at the default path, a template file
/// is automatically created and loaded. A relative `universe.path` is
/// resolved against the directory holding the file.
pub fn load_sheaf_config(path: Option<PathBuf>) -> Result<Option<SheafConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            if let Err(e) = create_default_config(&config_path) {
                tracing::warn!("Could not create default config template: {}", e);
                return Ok(None);
            }
            tracing::info!(
                "Config file created at {}. Edit [provider] before the first real run.",
                config_path.display()
            );
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let mut config: SheafConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    if let (Some(universe_path), Some(dir)) = (config.universe.path.as_mut(), config_path.parent())
    {
        if universe_path.is_relative() {
            *universe_path = dir.join(&*universe_path);
        }
    }

    config.harvest = config.harvest.with_env_overrides();
    Ok(Some(config))
}

/// Create a default configuration file with a template.
///
/// Creates the parent directory if it doesn't exist.
fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
