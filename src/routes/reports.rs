//! Report generation and report history.
//!
//! `POST /api/reports` answers with the file itself. Metadata travels in
//! response headers: `x-report-id`, `x-email-sent`, and `x-report-warning`
//! when the requested format failed or the report mail could not be sent.
//! The history supports resending a report, a CSV export of its metadata
//! and clearing all but the newest entries.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::Serialize;

use super::mail::{deliver, MailResponse};
use super::{blocking, CurrentSession};
use crate::error::{AppError, ReportError};
use crate::reports::{generate, metadata_csv, ReportMetadata, ReportRequest, REPORT_CLEAR_KEEP};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/reports", post(create).get(list))
        .route("/api/reports/export.csv", get(export_csv))
        .route("/api/reports/clear", post(clear))
        .route("/api/reports/{id}/resend", post(resend))
}

async fn list(current: CurrentSession) -> Json<Vec<ReportMetadata>> {
    Json(current.session.lock().reports().newest_first())
}

async fn create(
    State(state): State<AppState>,
    current: CurrentSession,
    Json(req): Json<ReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    // ---
    req.validate()?;

    let mailer = state.mailer.clone();
    let config = state.config.clone();

    // The session is locked to read the history and log the report, never
    // while the mail is submitted.
    let (report, email_sent, mail_error) = blocking(move || -> Result<_, ReportError> {
        let report = {
            let mut session = current.session.lock();
            let report = generate(&req, session.daily(), &config.location, Local::now())?;
            session.reports_mut().push(report.log_entry(&req));
            report
        };

        if !req.send_email {
            return Ok((report, false, None));
        }
        match mailer.send(&report.to_mail(&req.recipients)) {
            Ok(()) => {
                current.session.lock().reports_mut().mark_emailed(&report.metadata.id);
                Ok((report, true, None))
            }
            Err(e) => {
                tracing::warn!("Report {} mail failed: {}", report.metadata.id, e);
                Ok((report, false, Some(format!("Failed to send report email: {}", e))))
            }
        }
    })
    .await?
    .map_err(AppError::from)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(report.content_type));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!("attachment; filename=\"{}\"", report.filename))?,
    );
    headers.insert(
        HeaderName::from_static("x-report-id"),
        header_value(&report.metadata.id)?,
    );
    headers.insert(
        HeaderName::from_static("x-email-sent"),
        HeaderValue::from_static(if email_sent { "true" } else { "false" }),
    );
    if let Some(warning) = combined_warning(report.warning.as_deref(), mail_error.as_deref()) {
        headers.insert(HeaderName::from_static("x-report-warning"), header_value(&warning)?);
    }

    Ok((headers, report.bytes))
}

/// Handle `POST /api/reports/{id}/resend`.
///
/// Rebuilds the logged report from the session history and mails it to the
/// recipients of the original request.
async fn resend(
    State(state): State<AppState>,
    current: CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<MailResponse>, AppError> {
    // ---
    let (report, recipients) = {
        let session = current.session.lock();
        let entry = session
            .reports()
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("No report with id {}", id)))?;
        let report = entry.regenerate(session.daily(), &state.config.location)?;
        (report, entry.request.recipients.clone())
    };

    let response = deliver(&state, report.to_mail(&recipients), "Email resent").await?;
    if response.success {
        current.session.lock().reports_mut().mark_emailed(&id);
    }
    Ok(response)
}

async fn export_csv(current: CurrentSession) -> impl IntoResponse {
    // ---
    let csv = metadata_csv(current.session.lock().reports().metadata());
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"all_reports_metadata.csv\"",
            ),
        ],
        csv,
    )
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    success: bool,
    removed: usize,
    remaining: usize,
}

/// Handle `POST /api/reports/clear`: keep the newest [`REPORT_CLEAR_KEEP`].
async fn clear(current: CurrentSession) -> Json<ClearResponse> {
    // ---
    let mut session = current.session.lock();
    let removed = session.reports_mut().retain_latest(REPORT_CLEAR_KEEP);
    tracing::info!("Session {} cleared {} old reports", current.id, removed);
    Json(ClearResponse {
        success: true,
        removed,
        remaining: session.reports().len(),
    })
}

/// Both the render fallback and the mail failure are reported when both
/// happened.
fn combined_warning(render: Option<&str>, mail: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = render.into_iter().chain(mail).collect();
    (!parts.is_empty()).then(|| parts.join("; "))
}

/// Header values must be visible ASCII; anything else is replaced.
fn header_value(text: &str) -> Result<HeaderValue, AppError> {
    let ascii: String = text
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .collect();
    HeaderValue::from_str(&ascii).map_err(|e| AppError::Internal(e.to_string()))
}
