//! `codemetal-envwatch`: environmental monitoring dashboard.
//!
//! The crate is organized with the Explicit Module Boundary Pattern (EMBP):
//! each module exposes a small surface, and the HTTP layer in `routes` only
//! reaches the rest of the crate through the re-exports below.
//!
//! - `alerts`: threshold evaluation, alert state machine, mail dispatch and
//!   the audible alarm, run once per dashboard poll
//! - `session`: per-login state and the session registry
//! - `analytics`, `reports`: the analytics page and report generation
//! - `mail`, `config`: external collaborators and runtime configuration

use std::sync::Arc;

use axum::Router;

pub mod alerts;
pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod mail;
pub mod models;
pub mod reports;
pub mod routes;
pub mod session;
pub mod source;

pub use config::{Config, MailConfig};
pub use error::{AppError, MailError, ReportError};
pub use mail::{MailTransport, OutgoingMail};
pub use models::{Parameter, Sample};
pub use session::{RefreshRate, Session, SessionStore};

// ---

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub mailer: Arc<dyn MailTransport>,
}

impl AppState {
    pub fn new(config: Config, mailer: Arc<dyn MailTransport>) -> Self {
        // ---
        let idle = chrono::Duration::minutes(i64::from(config.session_idle_minutes));
        Self {
            config: Arc::new(config),
            sessions: SessionStore::new(idle),
            mailer,
        }
    }
}

/// Build the full application router (EMBP gateway in `routes`).
pub fn build_app(state: AppState) -> Router {
    routes::router(state)
}
