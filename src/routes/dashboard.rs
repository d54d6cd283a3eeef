//! Live dashboard: one tick per poll, settings, test alarm and quick exports.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};

use super::{blocking, CurrentSession};
use crate::alerts::AudioCue;
use crate::error::AppError;
use crate::reports::{sample_csv, sample_pdf};
use crate::session::DashboardView;
use crate::{AppState, RefreshRate};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/dashboard", get(tick))
        .route("/api/dashboard/settings", post(settings))
        .route("/api/dashboard/test-alarm", post(test_alarm))
        .route("/api/dashboard/export.csv", get(export_csv))
        .route("/api/dashboard/export.pdf", get(export_pdf))
}

/// Handle `GET /api/dashboard`.
///
/// Runs one tick for the caller's session. Ticks of one session never
/// overlap, but the session state is unlocked while alert mails are
/// submitted, so the other handlers here only wait for in-memory work.
async fn tick(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Result<Json<DashboardView>, AppError> {
    // ---
    let mailer = state.mailer.clone();
    let config = state.config.clone();

    let view = blocking(move || {
        current
            .session
            .tick(mailer.as_ref(), &config.location, Local::now())
    })
    .await?;

    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct SettingsRequest {
    sound_allowed: Option<bool>,
    refresh_rate: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SettingsResponse {
    success: bool,
    sound_allowed: bool,
    refresh_rate: RefreshRate,
}

async fn settings(
    current: CurrentSession,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    // ---
    let refresh_rate = req
        .refresh_rate
        .map(RefreshRate::try_from)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut session = current.session.lock();
    if let Some(allowed) = req.sound_allowed {
        session.sound_allowed = allowed;
    }
    if let Some(rate) = refresh_rate {
        session.refresh_rate = rate;
    }

    tracing::info!(
        "Session {} settings: sound_allowed={} refresh_rate={}s",
        current.id,
        session.sound_allowed,
        session.refresh_rate.secs()
    );

    Ok(Json(SettingsResponse {
        success: true,
        sound_allowed: session.sound_allowed,
        refresh_rate: session.refresh_rate,
    }))
}

#[derive(Debug, Serialize)]
struct TestAlarmResponse {
    success: bool,
    message: &'static str,
    audio: Option<AudioCue>,
}

async fn test_alarm(current: CurrentSession) -> Json<TestAlarmResponse> {
    // ---
    let audio = current.session.lock().test_alarm(Local::now());
    let message = if audio.is_some() {
        "Test alarm triggered"
    } else {
        "Sound alerts are disabled"
    };
    Json(TestAlarmResponse {
        success: audio.is_some(),
        message,
        audio,
    })
}

fn attachment(filename: String) -> String {
    format!("attachment; filename=\"{}\"", filename)
}

async fn export_csv(current: CurrentSession) -> Result<impl IntoResponse, AppError> {
    // ---
    let session = current.session.lock();
    let sample = session
        .latest()
        .ok_or_else(|| AppError::NotFound("No sensor data yet".into()))?;

    let filename = format!("sensor_data_{}.csv", sample.timestamp().format("%Y%m%d_%H%M%S"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(filename)),
        ],
        sample_csv(sample),
    ))
}

async fn export_pdf(
    State(state): State<AppState>,
    current: CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    // ---
    let session = current.session.lock();
    let sample = session
        .latest()
        .ok_or_else(|| AppError::NotFound("No sensor data yet".into()))?;

    let filename = format!("sensor_report_{}.pdf", sample.timestamp().format("%Y%m%d_%H%M%S"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, attachment(filename)),
        ],
        sample_pdf(sample, &state.config.location),
    ))
}
