use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sheaf_client::{KvStoreEnum, UpstreamClient};
use sheaf_core::{HarvestService, UniverseConfig};

/// Harvest service as wired by the server.
pub type Service = HarvestService<KvStoreEnum, UpstreamClient>;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub harvest_service: Service,

    /// Where the universe comes from; re-read on every invocation.
    pub universe: UniverseConfig,

    /// Expected bearer token for mutating endpoints.
    pub admin_token: Option<String>,

    /// Serializes invocations handled by this process. Separate processes
    /// sharing one store are not covered.
    pub invocation_lock: Arc<Mutex<()>>,

    /// Cancellation token for graceful shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(
        harvest_service: Service,
        universe: UniverseConfig,
        admin_token: Option<String>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            harvest_service,
            universe,
            admin_token: admin_token.filter(|t| !t.trim().is_empty()),
            invocation_lock: Arc::new(Mutex::new(())),
            shutdown_token,
        }
    }
}
