//! Plant analysis backed by a multimodal generative model.

mod gemini;

pub use gemini::GeminiAnalyzer;

use async_trait::async_trait;

/// Instruction sent alongside every image.
pub const PLANT_PROMPT: &str = "Analyze this plant image and provide detailed analysis of its \
species, health, and care recommendations, its characteristics, care instructions, and any \
interesting facts. Please provide the response in plain text without using any markdown \
formatting.";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("failed to fetch image: {0}")]
    Fetch(String),
    #[error("failed to fetch image: remote host answered {0}")]
    ImageStatus(u16),
    #[error("model request failed: {0}")]
    Model(String),
    #[error("model returned no text")]
    EmptyResponse,
}

/// Turns an already uploaded image into free-form analysis text.
///
/// One call is one metered request upstream: no caching, no retry.
#[async_trait]
pub trait PlantAnalyzer: Send + Sync {
    async fn analyze(&self, image_url: &str, mime_type: &str) -> Result<String, AnalysisError>;
}
