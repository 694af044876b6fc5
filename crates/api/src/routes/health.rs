//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::{CrmService, IdentityService, Transformer};
use serde::Serialize;

use super::registration::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub identity_required: bool,
    /// Fire-and-forget calls still running.
    pub background_tasks: usize,
}

/// GET /health — returns service health status.
pub async fn check<C, I, T>(State(state): State<Arc<AppState<C, I, T>>>) -> Json<HealthResponse>
where
    C: CrmService + 'static,
    I: IdentityService + 'static,
    T: Transformer + 'static,
{
    Json(HealthResponse {
        status: "ok",
        identity_required: state.saga.policy().identity_required,
        background_tasks: state.saga.background_tasks().in_flight(),
    })
}
