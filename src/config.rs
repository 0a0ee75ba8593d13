use crate::error::{AnalyzerError, Result};

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const FALLBACK_API_KEY_VAR: &str = "API_KEY";
pub const DEFAULT_STORAGE_KEY: &str = "fin-analyzer-storage";

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub api_key: String,
    pub extraction_model: String,
    pub search_model: String,
    pub speech_model: String,
    pub image_model: String,
    pub live_model: String,
    pub voice: String,
    /// Thinking budget for document extraction.
    pub thinking_budget: u32,
    /// Thinking budget for grounded market scans.
    pub search_thinking_budget: u32,
    pub temperature: f32,
    /// Correction rounds after a schema rejection before giving up.
    pub max_repair_attempts: usize,
    pub storage_key: String,
}

impl AnalyzerConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            extraction_model: "gemini-3-pro-preview".to_string(),
            search_model: "gemini-3-pro-preview".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            live_model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Kore".to_string(),
            thinking_budget: 8192,
            search_thinking_budget: 2048,
            temperature: 0.1,
            max_repair_attempts: 2,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }

    /// Reads the credential from `GEMINI_API_KEY`, then `API_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = [API_KEY_VAR, FALLBACK_API_KEY_VAR]
            .iter()
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .ok_or_else(|| {
                AnalyzerError::MissingCredential(format!(
                    "set {} (or {})",
                    API_KEY_VAR, FALLBACK_API_KEY_VAR
                ))
            })?;
        Ok(Self::new(key))
    }

    pub fn with_extraction_model(mut self, model: impl Into<String>) -> Self {
        self.extraction_model = model.into();
        self
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = budget;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_repair_attempts(mut self, attempts: usize) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }
}
