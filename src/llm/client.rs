use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, Result};
use crate::llm::capabilities::{GroundedSearch, ImageGeneration, SpeechSynthesis, UnderstandingModel};
use crate::llm::types::*;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    extraction_model: String,
    search_model: String,
    speech_model: String,
    image_model: String,
    search_thinking_budget: u32,
}

impl GeminiClient {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: GEMINI_BASE_URL.to_string(),
            extraction_model: config.extraction_model.clone(),
            search_model: config.search_model.clone(),
            speech_model: config.speech_model.clone(),
            image_model: config.image_model.clone(),
            search_thinking_budget: config.search_thinking_budget,
        }
    }

    /// Points the client at another endpoint, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate_content(
        &self,
        model: &str,
        payload: &GenerateContentRequest,
    ) -> Result<Candidate> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let res = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        let body = res.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        debug!("{} answered with {} bytes", model, body.len());

        let response: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            AnalyzerError::ExtractionRejected(format!("unreadable response: {}", e))
        })?;

        response
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .ok_or_else(|| AnalyzerError::ExtractionRejected("No candidates returned".to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> AnalyzerError {
    AnalyzerError::ExtractionUnavailable(format!("transport error: {}", e))
}

fn status_error(status: StatusCode, body: &str) -> AnalyzerError {
    let message = format!("Gemini API Error (status {}): {}", status, body);
    match status {
        StatusCode::BAD_REQUEST => AnalyzerError::ExtractionRejected(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            AnalyzerError::ExtractionUnavailable(message)
        }
        s if s.is_server_error() => AnalyzerError::ExtractionUnavailable(message),
        _ => AnalyzerError::ExtractionRejected(message),
    }
}

fn first_inline(candidate: &Candidate) -> Option<&Blob> {
    candidate
        .content
        .as_ref()?
        .parts
        .iter()
        .find_map(Part::as_inline)
}

#[async_trait]
impl UnderstandingModel for GeminiClient {
    async fn generate_structured(&self, request: StructuredRequest) -> Result<String> {
        let payload = GenerateContentRequest {
            contents: request.contents,
            system_instruction: request.system_instruction.map(Content::user),
            tools: Vec::new(),
            generation_config: GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: request.response_schema,
                thinking_config: request
                    .thinking_budget
                    .map(|thinking_budget| ThinkingConfig { thinking_budget }),
                temperature: request.temperature,
                ..Default::default()
            },
        };

        let candidate = self.generate_content(&self.extraction_model, &payload).await?;
        let text = candidate
            .content
            .map(|c| c.joined_text())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AnalyzerError::ExtractionRejected(
                "Model returned no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl GroundedSearch for GeminiClient {
    async fn search(&self, prompt: &str) -> Result<GroundedAnswer> {
        let payload = GenerateContentRequest {
            contents: vec![Content::user(prompt)],
            system_instruction: None,
            tools: vec![Tool::GoogleSearch {}],
            generation_config: GenerationConfig {
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: self.search_thinking_budget,
                }),
                ..Default::default()
            },
        };

        let candidate = self.generate_content(&self.search_model, &payload).await?;
        let text = candidate
            .content
            .as_ref()
            .map(Content::joined_text)
            .filter(|t| !t.trim().is_empty());
        let sources = candidate
            .grounding_metadata
            .map(|m| m.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .map(|chunk| {
                let web = chunk.web.unwrap_or_default();
                GroundingSource {
                    title: web.title,
                    uri: web.uri,
                }
            })
            .collect();

        Ok(GroundedAnswer { text, sources })
    }
}

#[async_trait]
impl SpeechSynthesis for GeminiClient {
    async fn synthesize(&self, script: &str, voice: &str) -> Result<String> {
        let payload = GenerateContentRequest {
            contents: vec![Content::user(script)],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::prebuilt(voice)),
                ..Default::default()
            },
        };

        let candidate = self.generate_content(&self.speech_model, &payload).await?;
        first_inline(&candidate)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| AnalyzerError::ExtractionRejected("No audio returned".to_string()))
    }
}

#[async_trait]
impl ImageGeneration for GeminiClient {
    async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> Result<GeneratedImage> {
        let payload = GenerateContentRequest {
            contents: vec![Content::user(prompt)],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.to_string(),
                }),
                ..Default::default()
            },
        };

        let candidate = self.generate_content(&self.image_model, &payload).await?;
        first_inline(&candidate)
            .map(|blob| GeneratedImage {
                mime_type: blob.mime_type.clone(),
                data_base64: blob.data.clone(),
            })
            .ok_or_else(|| AnalyzerError::ExtractionRejected("No image returned".to_string()))
    }
}
