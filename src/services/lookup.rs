//! UPCitemdb product lookup client.
//!
//! One GET per key with a bounded timeout. No retries: a failed lookup
//! fails the job and the caller may resubmit the key later.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::models::product::{LookupKey, RawProductRecord};

/// Source of raw product data by UPC.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn lookup(&self, key: &LookupKey) -> Result<RawProductRecord, LookupError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("No product found for UPC {0}")]
    NotFound(String),

    #[error("HTTP request to UPCitemdb failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("UPCitemdb returned status {0}")]
    Status(StatusCode),

    #[error("Malformed UPCitemdb response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl LookupError {
    /// Whether a later attempt for the same key might succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LookupError::NotFound(_))
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    items: Vec<LookupItem>,
}

#[derive(Debug, Deserialize)]
struct LookupItem {
    title: Option<String>,
    brand: Option<String>,
    description: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

impl From<LookupItem> for RawProductRecord {
    fn from(item: LookupItem) -> Self {
        Self {
            title: item.title.unwrap_or_default(),
            brand: item.brand.unwrap_or_default(),
            description: item.description.unwrap_or_default(),
            image_urls: item.images,
        }
    }
}

/// Client for the UPCitemdb REST API.
pub struct UpcItemDbClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl UpcItemDbClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("upc-product-lookup/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        if api_key.is_none() {
            tracing::warn!("UPCitemdb API key not configured, using the trial endpoint");
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn lookup_url(&self) -> String {
        match self.api_key {
            Some(_) => format!("{}/v1/lookup", self.base_url),
            None => format!("{}/trial/lookup", self.base_url),
        }
    }
}

#[async_trait]
impl ProductLookup for UpcItemDbClient {
    async fn lookup(&self, key: &LookupKey) -> Result<RawProductRecord, LookupError> {
        tracing::info!(upc = %key, "Fetching product data from UPCitemdb");

        let mut request = self
            .http
            .get(self.lookup_url())
            .query(&[("upc", key.as_str())])
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(api_key) = &self.api_key {
            request = request
                .header("user_key", api_key)
                .header("key_type", "3scale");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status));
        }

        let body = response.bytes().await?;
        parse_lookup_body(key, &body)
    }
}

/// Decode a lookup response body, taking the first item.
fn parse_lookup_body(key: &LookupKey, body: &[u8]) -> Result<RawProductRecord, LookupError> {
    let parsed: LookupResponse = serde_json::from_slice(body)?;
    match parsed.items.into_iter().next() {
        Some(item) => {
            tracing::info!(upc = %key, "Retrieved product data");
            Ok(item.into())
        }
        None => Err(LookupError::NotFound(key.to_string())),
    }
}
