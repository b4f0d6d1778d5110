use axum::{Router, response::IntoResponse, routing};

use crate::core::{app_error::StdResponse, app_state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", routing::get(health))
}

async fn health() -> impl IntoResponse {
    StdResponse::<(), &str> {
        data: None,
        message: Some("ok"),
    }
}
