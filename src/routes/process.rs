use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{BatchResponse, ProcessResponse};
use crate::models::job::ProcessOutcome;
use crate::routes::{api_error, ApiError};
use crate::services::coordinator::CoordinatorError;
use crate::services::csv_import::{self, BatchUploadError};

fn coordinator_error(e: CoordinatorError) -> ApiError {
    match e {
        CoordinatorError::InvalidKey(_) => api_error(StatusCode::BAD_REQUEST, "Invalid UPC"),
        CoordinatorError::Cache(e) => {
            tracing::error!(error = %e, "Cache check failed");
            api_error(StatusCode::SERVICE_UNAVAILABLE, "Cache unavailable")
        }
    }
}

/// POST /api/process/{upc} — start background processing, returns immediately.
pub async fn process_upc(
    State(state): State<AppState>,
    Path(upc): Path<String>,
) -> Result<(StatusCode, Json<ProcessResponse>), ApiError> {
    let outcome = state
        .coordinator
        .request_processing(&upc)
        .await
        .map_err(coordinator_error)?;
    tracing::debug!(upc = %upc, outcome = %outcome, "Processing request handled");

    let response = match outcome {
        ProcessOutcome::AlreadyCached => (
            StatusCode::OK,
            ProcessResponse {
                status: "already_cached".to_string(),
                upc,
                check_at: None,
            },
        ),
        ProcessOutcome::AlreadyProcessing => (
            StatusCode::ACCEPTED,
            ProcessResponse {
                status: "processing".to_string(),
                upc,
                check_at: None,
            },
        ),
        ProcessOutcome::Started => (
            StatusCode::ACCEPTED,
            ProcessResponse {
                status: "processing_started".to_string(),
                check_at: Some(format!("/api/product/{upc}")),
                upc,
            },
        ),
    };
    Ok((response.0, Json(response.1)))
}

/// POST /api/process/batch — queue every new UPC from an uploaded CSV.
pub async fn process_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    let upcs = read_upload(&mut multipart).await.map_err(|e| {
        tracing::warn!(error = %e, "Rejected batch upload");
        api_error(StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let summary = state
        .coordinator
        .submit_batch(&upcs)
        .await
        .map_err(coordinator_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            status: "batch_processing_queued".to_string(),
            total_upcs_in_file: summary.total,
            upcs_queued: summary.queued,
            upcs_ignored_cached: summary.ignored,
            message: "Processing started in the background. Check /api/product/<upc> for results later."
                .to_string(),
        }),
    ))
}

/// Pull the `file` part out of the multipart body and read its UPC column.
async fn read_upload(multipart: &mut Multipart) -> Result<Vec<String>, BatchUploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BatchUploadError::Malformed(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        csv_import::check_filename(field.file_name())?;
        let data = field
            .bytes()
            .await
            .map_err(|e| BatchUploadError::Malformed(e.to_string()))?;
        return csv_import::read_upc_column(&data);
    }
    Err(BatchUploadError::MissingFile)
}
