//! Manual mail actions from the reports page, and the delivery helper the
//! other mail-sending routes share.

use axum::{extract::State, routing::post, Json, Router};
use chrono::Local;
use serde::Serialize;

use super::{blocking, CurrentSession};
use crate::error::AppError;
use crate::reports::{daily_summary_mail, test_mail};
use crate::{AppState, OutgoingMail};

// ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/mail/test", post(send_test))
        .route("/api/mail/daily-summary", post(send_daily_summary))
}

#[derive(Debug, Serialize)]
pub(super) struct MailResponse {
    pub success: bool,
    pub message: String,
}

async fn send_test(
    State(state): State<AppState>,
    _current: CurrentSession,
) -> Result<Json<MailResponse>, AppError> {
    deliver(&state, test_mail(Local::now()), "Test email sent").await
}

async fn send_daily_summary(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Result<Json<MailResponse>, AppError> {
    // ---
    let mail = {
        let session = current.session.lock();
        let sample = session
            .latest()
            .ok_or_else(|| AppError::BadRequest("No sensor data yet".into()))?;
        daily_summary_mail(sample, &state.config.location, Local::now())
    };
    deliver(&state, mail, "Daily summary sent").await
}

/// Submit on the blocking pool. Transport failures are reported in the body,
/// not as an HTTP error.
pub(super) async fn deliver(
    state: &AppState,
    mail: OutgoingMail,
    ok_message: &str,
) -> Result<Json<MailResponse>, AppError> {
    // ---
    let mailer = state.mailer.clone();
    let configured = mailer.is_configured();
    let subject = mail.subject.clone();

    let result = blocking(move || mailer.send(&mail)).await?;

    let response = match result {
        Ok(()) if configured => MailResponse {
            success: true,
            message: ok_message.to_string(),
        },
        Ok(()) => MailResponse {
            success: true,
            message: format!("{} (mail not configured, nothing was delivered)", ok_message),
        },
        Err(e) => {
            tracing::warn!("Mail {:?} failed: {}", subject, e);
            MailResponse {
                success: false,
                message: format!("Failed to send email: {}", e),
            }
        }
    };
    Ok(Json(response))
}
