pub mod health;
pub mod mcp;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the API router.
///
/// - `POST /mcp`, `DELETE /mcp`: the client-facing JSON-RPC endpoint.
/// - `GET /healthz`: liveness plus session and bridge counts.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mcp", post(mcp::post_message).delete(mcp::delete_session))
        .route("/healthz", get(health::healthz))
}
