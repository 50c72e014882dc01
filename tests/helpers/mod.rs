//! Test helper utilities for E2E testing

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Response from POST /api/process/{upc}
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub status: String,
    pub upc: String,
    pub check_at: Option<String>,
}

/// Response from GET /api/product/{upc}
#[derive(Debug, Serialize, Deserialize)]
pub struct ProductResponse {
    pub upc: String,
    pub title: String,
    pub brand: String,
    pub description: String,
    pub images: Vec<String>,
    pub best_image: Option<String>,
    pub cached: bool,
}

/// Ask the server to process a UPC.
pub async fn request_processing(
    client: &reqwest::Client,
    base_url: &str,
    upc: &str,
) -> Result<(reqwest::StatusCode, ProcessResponse), Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/process/{}", base_url, upc))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Process request failed with status {}: {}", status, error_text).into());
    }

    Ok((status, response.json::<ProcessResponse>().await?))
}

/// Poll the read path until the product appears (with timeout).
///
/// Returns `Ok(None)` if the product never shows up; a failed job leaves
/// no trace other than a missing cache entry.
pub async fn poll_product(
    client: &reqwest::Client,
    base_url: &str,
    upc: &str,
    timeout_secs: u64,
) -> Result<Option<ProductResponse>, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/product/{}", base_url, upc))
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => return Ok(Some(response.json().await?)),
            reqwest::StatusCode::NOT_FOUND => {
                if attempt % 10 == 0 && attempt > 0 {
                    println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
                }
                sleep(Duration::from_millis(500)).await;
            }
            other => {
                let error_text = response.text().await?;
                return Err(format!("Product read failed with status {}: {}", other, error_text).into());
            }
        }
    }

    Ok(None)
}
