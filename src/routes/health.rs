// src/routes/health.rs
//! Liveness endpoint for the envwatch service.
//!
//! This module defines the `/health` route used by container orchestrators
//! and the integration tests to verify that the service is running. It is a
//! sibling module in the `routes` directory and follows the Explicit Module
//! Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler and response type
//! - Exports to the gateway (`mod.rs`): a subrouter containing `/health`

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: usize,
    mail_configured: bool,
}

/// Handle `GET /health`.
///
/// Reports the number of live sessions and whether alert mail is actually
/// delivered. Never touches the mail relay itself.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.sessions.len(),
        mail_configured: state.mailer.is_configured(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
