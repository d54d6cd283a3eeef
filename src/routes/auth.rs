//! Login and logout.

use axum::{extract::State, routing::post, Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CurrentSession;
use crate::auth::verify_login;
use crate::error::AppError;
use crate::{AppState, RefreshRate, Session};

// ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    token: Uuid,
    username: String,
    location: String,
    refresh_rate: RefreshRate,
    sound_allowed: bool,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    // ---
    verify_login(&state.config, req.username.trim(), &req.password)?;

    let session = Session::new(req.username.trim(), state.config.default_refresh, Local::now());
    let sound_allowed = session.sound_allowed;
    let token = state.sessions.insert(session, Local::now());

    Ok(Json(LoginResponse {
        success: true,
        token,
        username: req.username.trim().to_string(),
        location: state.config.location.clone(),
        refresh_rate: state.config.default_refresh,
        sound_allowed,
    }))
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    success: bool,
}

async fn logout(State(state): State<AppState>, current: CurrentSession) -> Json<LogoutResponse> {
    Json(LogoutResponse {
        success: state.sessions.remove(&current.id),
    })
}
