use clap::Parser;
use std::path::PathBuf;

/// Server configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug, Clone)]
#[command(name = "sheaf-server")]
#[command(author, version, about = "HTTP invocation endpoint and snapshot reader for sheaf")]
pub struct ServerConfig {
    /// Base URL of the key-value REST store
    #[arg(long, env = "KV_REST_URL")]
    pub kv_rest_url: Option<String>,

    /// Bearer token for the key-value REST store
    #[arg(long, env = "KV_REST_TOKEN", hide_env_values = true)]
    pub kv_rest_token: Option<String>,

    /// API key for the upstream provider
    #[arg(long, env = "PROVIDER_API_KEY", hide_env_values = true)]
    pub provider_api_key: Option<String>,

    /// Bearer token required by POST endpoints. Unset disables them.
    #[arg(long, env = "SHEAF_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Path to sheaf.toml
    #[arg(long, env = "SHEAF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Keep state in process memory instead of the REST store
    #[arg(long)]
    pub memory_store: bool,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Allowed CORS origins, comma-separated, or "*"
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,
}
