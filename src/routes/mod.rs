pub mod health;
pub mod metrics;
pub mod process;
pub mod product;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::services::ServeDir;

use crate::app_state::AppState;
use crate::models::api::ErrorResponse;
use crate::services::images::PUBLIC_IMAGE_PATH;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Application routes without the metrics endpoint or middleware layers.
pub fn router(state: AppState) -> Router {
    let images = ServeDir::new(state.image_dir.as_path());

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .route("/api/product/{upc}", get(product::get_product))
        .route("/api/process/batch", post(process::process_batch))
        .route("/api/process/{upc}", post(process::process_upc))
        .nest_service(PUBLIC_IMAGE_PATH, images)
        .with_state(state)
}
