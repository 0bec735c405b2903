use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{AnalysisError, PlantAnalyzer, PLANT_PROMPT};
use crate::config::GeminiConfig;
use crate::images::remote::{fetch_image, FetchError};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini `generateContent` client.
pub struct GeminiAnalyzer {
    http: reqwest::Client,
    api_key: String,
    url: String,
}

impl GeminiAnalyzer {
    pub fn new(http: reqwest::Client, cfg: &GeminiConfig) -> Self {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            cfg.endpoint.trim_end_matches('/'),
            cfg.model
        );
        Self {
            http,
            api_key: cfg.api_key.clone(),
            url,
        }
    }
}

fn build_request<'a>(mime_type: &'a str, image: &[u8]) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: PLANT_PROMPT },
                Part::Inline {
                    inline_data: InlineData {
                        mime_type,
                        data: Base64::encode_string(image),
                    },
                },
            ],
        }],
    }
}

/// Text of the first candidate, all parts joined.
fn extract_text(resp: GenerateResponse) -> Result<String, AnalysisError> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl PlantAnalyzer for GeminiAnalyzer {
    #[instrument(skip(self))]
    async fn analyze(&self, image_url: &str, mime_type: &str) -> Result<String, AnalysisError> {
        let image = fetch_image(&self.http, image_url).await.map_err(|e| match e {
            FetchError::Status(code) => AnalysisError::ImageStatus(code),
            FetchError::Request(e) => AnalysisError::Fetch(e.to_string()),
        })?;

        let response = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(mime_type, &image))
            .send()
            .await
            .map_err(|e| AnalysisError::Model(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Model(format!("{status} - {body}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Model(e.to_string()))?;
        let text = extract_text(parsed)?;
        debug!(chars = text.len(), "analysis completed");
        Ok(text)
    }
}
