use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// One image handed to the ranking model.
#[derive(Debug, Clone)]
pub struct RankImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Multi-image model that answers a text prompt with free text.
#[async_trait]
pub trait ImageRanker: Send + Sync {
    async fn rank(&self, prompt: &str, images: &[RankImage]) -> Result<String, RankingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Gemini returned no text")]
    EmptyResponse,
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, RankingError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: GEMINI_API_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url, self.model
        )
    }
}

fn build_request<'a>(prompt: &'a str, images: &'a [RankImage]) -> GenerateRequest<'a> {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(Part::Text { text: prompt });
    parts.extend(images.iter().map(|img| Part::InlineData {
        inline_data: InlineData {
            mime_type: &img.mime_type,
            data: engine.encode(&img.bytes),
        },
    }));
    GenerateRequest {
        contents: vec![Content { parts }],
    }
}

fn response_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl ImageRanker for GeminiClient {
    async fn rank(&self, prompt: &str, images: &[RankImage]) -> Result<String, RankingError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt, images))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RankingError::Status { status, body });
        }

        let parsed: GenerateResponse = response.json().await?;
        response_text(parsed).ok_or(RankingError::EmptyResponse)
    }
}
