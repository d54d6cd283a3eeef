//! Routes gateway (EMBP).
//!
//! Each sibling module exports a subrouter over [`AppState`]; this module
//! merges them and owns the pieces they share: the session extractor and
//! the blocking-task helper.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::Router;
use chrono::Local;
use uuid::Uuid;

use crate::error::AppError;
use crate::session::SharedSession;
use crate::AppState;

mod analytics;
mod auth;
mod dashboard;
mod health;
mod mail;
mod reports;
mod shell;

// ---

/// Header carrying the token returned by `POST /api/login`.
pub const SESSION_HEADER: &str = "x-session-token";

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(shell::router())
        .merge(health::router())
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(analytics::router())
        .merge(reports::router())
        .merge(mail::router())
        .with_state(state)
}

/// The caller's session, resolved from [`SESSION_HEADER`]. Resolving counts
/// as activity and keeps the session from expiring.
pub struct CurrentSession {
    pub id: Uuid,
    pub session: SharedSession,
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // ---
        let id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(AppError::Unauthorized)?;

        let session = state
            .sessions
            .resolve(&id, Local::now())
            .ok_or(AppError::Unauthorized)?;
        Ok(Self { id, session })
    }
}

/// Run `f` on the blocking pool. Ticks and mail submission go through here
/// because the SMTP transport is synchronous.
async fn blocking<F, T>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("worker task failed: {}", e)))
}
