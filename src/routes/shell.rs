//! The page shell and its static assets.

use axum::{
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::alerts::{BEEP_PATH, BEEP_WAV};
use crate::AppState;

// ---

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route(BEEP_PATH, get(beep))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// The alarm tone. Cue URLs carry a nonce query so the browser replays it.
async fn beep() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        BEEP_WAV.as_slice(),
    )
}
