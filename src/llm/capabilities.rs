//! Model capabilities the analyzer depends on. `GeminiClient` implements all
//! of them; tests substitute scripted fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::types::{GeneratedImage, GroundedAnswer, StructuredRequest};

/// Multimodal understanding with a constrained JSON response.
#[async_trait]
pub trait UnderstandingModel: Send + Sync {
    /// Returns the raw text of the model's answer.
    async fn generate_structured(&self, request: StructuredRequest) -> Result<String>;
}

#[async_trait]
pub trait GroundedSearch: Send + Sync {
    async fn search(&self, prompt: &str) -> Result<GroundedAnswer>;
}

#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    /// Returns base64 encoded 24 kHz mono PCM16.
    async fn synthesize(&self, script: &str, voice: &str) -> Result<String>;
}

#[async_trait]
pub trait ImageGeneration: Send + Sync {
    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> Result<GeneratedImage>;
}
