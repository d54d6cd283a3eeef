//! Analytics page: the filtered daily history with its statistics, plus CSV
//! and Excel downloads and a mail of the selected range.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use super::mail::{deliver, MailResponse};
use super::{blocking, CurrentSession};
use crate::analytics::{analyze, filter_range, AnalyticsView, DailyRecord};
use crate::error::AppError;
use crate::reports::{analytics_mail, analytics_workbook, records_csv, AnalyticsRange};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/analytics", get(handler))
        .route("/api/analytics/export.csv", get(export_csv))
        .route("/api/analytics/export.xlsx", get(export_xlsx))
        .route("/api/analytics/email", post(email))
}

/// Inclusive date range; either end may be omitted.
#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl AnalyticsQuery {
    fn check(&self) -> Result<(), AppError> {
        // ---
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(AppError::BadRequest(format!(
                    "start {} is after end {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// The session's records in range, with the range they resolve to.
    fn select(&self, current: &CurrentSession) -> Result<(Vec<DailyRecord>, AnalyticsRange), AppError> {
        // ---
        self.check()?;
        let records = filter_range(current.session.lock().daily(), self.start, self.end);
        let range = AnalyticsRange::resolve(self.start, self.end, &records);
        Ok((records, range))
    }
}

async fn handler(
    current: CurrentSession,
    Query(params): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsView>, AppError> {
    // ---
    params.check()?;

    let view = analyze(current.session.lock().daily(), params.start, params.end);
    tracing::debug!(
        "Analytics for {:?}..{:?}: {} days",
        params.start,
        params.end,
        view.records.len()
    );
    Ok(Json(view))
}

fn attachment(filename: String) -> String {
    format!("attachment; filename=\"{}\"", filename)
}

async fn export_csv(
    current: CurrentSession,
    Query(params): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    // ---
    let (records, range) = params.select(&current)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(range.csv_filename())),
        ],
        records_csv(&records),
    ))
}

async fn export_xlsx(
    State(state): State<AppState>,
    current: CurrentSession,
    Query(params): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, AppError> {
    // ---
    let (records, range) = params.select(&current)?;
    let config = state.config.clone();
    let bytes = blocking(move || analytics_workbook(&records, range, &config.location, Local::now()))
        .await??;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (header::CONTENT_DISPOSITION, attachment(range.xlsx_filename())),
        ],
        bytes,
    ))
}

/// Handle `POST /api/analytics/email?start=..&end=..`: mail the Excel export
/// of the range to the default recipient.
async fn email(
    State(state): State<AppState>,
    current: CurrentSession,
    Query(params): Query<AnalyticsQuery>,
) -> Result<Json<MailResponse>, AppError> {
    // ---
    let (records, range) = params.select(&current)?;
    let mail = analytics_mail(&records, range, &state.config.location, Local::now())?;
    tracing::info!("Mailing analytics export for {}", range.label());
    deliver(&state, mail, "Analytics report sent").await
}
