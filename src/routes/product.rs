use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::product::{FormattedResult, LookupKey};
use crate::routes::{api_error, ApiError};

/// GET /api/product/{upc} — cached product data only; never starts a job.
pub async fn get_product(
    State(state): State<AppState>,
    Path(upc): Path<String>,
) -> Result<Json<FormattedResult>, ApiError> {
    let key = LookupKey::parse(&upc)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid UPC format"))?;

    match state.cache.get(&key).await {
        Ok(Some(result)) => Ok(Json(result)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Product not found in cache")),
        Err(e) => {
            tracing::error!(upc = %key, error = %e, "Cache read failed");
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "Cache unavailable"))
        }
    }
}
