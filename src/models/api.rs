use serde::{Deserialize, Serialize};

/// Response for `POST /api/process/{upc}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub status: String,
    pub upc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_at: Option<String>,
}

/// Response for `POST /api/process/batch`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status: String,
    pub total_upcs_in_file: usize,
    pub upcs_queued: usize,
    pub upcs_ignored_cached: usize,
    pub message: String,
}

/// Body of every 4xx/5xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
