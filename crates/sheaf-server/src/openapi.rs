//! OpenAPI documentation configuration.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto::{
    BatchStatusDto, CursorDto, HealthResponse, InvocationResponse, InvokeParams,
    SnapshotSummaryResponse, StatusResponse,
};
use crate::handlers::{harvest, health, snapshot};

/// OpenAPI documentation for the sheaf API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "sheaf API",
        version = "1.0.0",
        description = "Checkpointed batch harvester.

Each invocation processes one batch of the work-item universe, or merges the
cycle into a published snapshot once every batch is done. An external
scheduler calls `POST /api/v1/invoke` on a fixed interval.

## Quick Start

1. Check server health: `GET /api/v1/health`
2. Run one invocation: `POST /api/v1/invoke` with `Authorization: Bearer <SHEAF_ADMIN_TOKEN>`
3. Read the result: `GET /api/v1/snapshot`
",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        health::health_check,
        harvest::invoke,
        harvest::merge,
        harvest::get_status,
        snapshot::get_snapshot,
        snapshot::get_snapshot_summary,
    ),
    components(
        schemas(
            // Request types
            InvokeParams,
            // Response types
            HealthResponse,
            InvocationResponse,
            StatusResponse,
            CursorDto,
            BatchStatusDto,
            SnapshotSummaryResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "system", description = "System health"),
        (name = "harvest", description = "Invocations and checkpoint state"),
        (name = "snapshot", description = "Published snapshot"),
    )
)]
pub struct ApiDoc;

/// Registers the bearer scheme used by the invocation endpoints.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
