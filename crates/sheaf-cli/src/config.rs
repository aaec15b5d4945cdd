use clap::{Parser, Subcommand};
use sheaf_core::WindowOverride;
use std::path::PathBuf;
use std::sync::LazyLock;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    // Use VERGEN_GIT_SHA for the commit hash (with safe slicing)
    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"); // YYYY-MM-DD
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "sheaf")]
#[command(
    author,
    version = version_info(),
    about = "Checkpointed batch harvester for rate-limited record providers"
)]
#[command(after_help = "Examples:
  sheaf invoke                         # Next batch, or merge at the end of the cycle
  sheaf invoke --offset 100 --limit 10 # Re-run part of a slot by hand
  sheaf merge                          # Publish whatever batches exist
  sheaf status
  sheaf snapshot --summary
  sheaf run --interval-secs 300

Credentials:
  KV_REST_URL / KV_REST_TOKEN  key-value REST store (not needed with --memory-store)
  PROVIDER_API_KEY             sent in provider.api_key_header when configured")]
pub struct Config {
    /// Base URL of the key-value REST store
    #[arg(long, env = "KV_REST_URL")]
    pub kv_rest_url: Option<String>,

    /// Bearer token for the key-value REST store
    #[arg(long, env = "KV_REST_TOKEN", hide_env_values = true)]
    pub kv_rest_token: Option<String>,

    /// API key for the upstream provider
    #[arg(long, env = "PROVIDER_API_KEY", hide_env_values = true)]
    pub provider_api_key: Option<String>,

    /// Custom path to sheaf.toml (defaults to ~/.config/sheaf/sheaf.toml)
    #[arg(short, long, env = "SHEAF_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Keep state in process memory instead of the REST store
    #[arg(long, global = true)]
    pub memory_store: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Returns the store URL and token, required unless `--memory-store` is set.
    pub fn kv_credentials(&self) -> anyhow::Result<(&str, &str)> {
        let url = self
            .kv_rest_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("KV_REST_URL is not set (or pass --memory-store)"))?;
        let token = self
            .kv_rest_token
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("KV_REST_TOKEN is not set (or pass --memory-store)"))?;
        Ok((url, token))
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one invocation: the next batch, or the merge once every slot is done
    #[command(after_help = "Examples:
  sheaf invoke
  sheaf invoke --offset 150            # Re-run the slot starting at 150
  sheaf invoke --limit 5               # Only the first 5 items of the current window")]
    Invoke {
        /// Slot start; must be a multiple of the batch size
        #[arg(long)]
        offset: Option<usize>,
        /// Items to fetch, clamped to [1, batch_size]
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Merge existing batch records and publish the snapshot
    Merge,
    /// Show the cursor, last run and last batch status
    Status,
    /// Print the published snapshot as JSON
    Snapshot {
        /// Print counts only
        #[arg(long)]
        summary: bool,
    },
    /// Invoke repeatedly on a fixed interval until Ctrl-C
    Run {
        /// Seconds between invocations
        #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: u64,
        /// Stop once the cycle has been merged
        #[arg(long)]
        until_merged: bool,
    },
}

impl Command {
    /// Manual window for `invoke`; natural window for everything else.
    pub fn window(&self) -> WindowOverride {
        match self {
            Command::Invoke { offset, limit } => WindowOverride {
                offset: *offset,
                limit: *limit,
            },
            _ => WindowOverride::default(),
        }
    }
}
