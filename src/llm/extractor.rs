use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use json_patch::Patch;
use log::{debug, info, warn};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, Result, SchemaError};
use crate::llm::capabilities::UnderstandingModel;
use crate::llm::prompts::{repair_prompt, EXTRACTION_PROMPT, REPAIR_SYSTEM_PROMPT};
use crate::llm::types::{Content, ExtractionEvent, Part, StructuredRequest};
use crate::llm::utils::clean_json_output;
use crate::schema::{ExtractedReport, FinancialReport};
use crate::utils::{looks_like_pdf, now_millis};
use crate::validation::ReportValidator;

pub const PDF_MIME: &str = "application/pdf";

/// Turns one PDF into a validated [`FinancialReport`] with fresh identity.
pub struct ExtractionClient<M> {
    model: M,
    validator: ReportValidator,
    thinking_budget: u32,
    temperature: f32,
    max_repair_attempts: usize,
}

impl<M: UnderstandingModel> ExtractionClient<M> {
    pub fn new(model: M, config: &AnalyzerConfig) -> Self {
        Self {
            model,
            validator: ReportValidator::new(),
            thinking_budget: config.thinking_budget,
            temperature: config.temperature,
            max_repair_attempts: config.max_repair_attempts,
        }
    }

    pub fn with_validator(mut self, validator: ReportValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_max_repair_attempts(mut self, attempts: usize) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Reads a file from disk and extracts it. Paths whose extension maps to a
    /// non-PDF media type are rejected without reading them.
    pub async fn extract_path(
        &self,
        path: &Path,
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<FinancialReport> {
        if let Some(mime) = mime_guess::from_path(path).first() {
            if mime.essence_str() != PDF_MIME {
                return Err(AnalyzerError::ExtractionRejected(format!(
                    "{:?} is {}, not a PDF",
                    path, mime
                )));
            }
        }
        let bytes = fs::read(path).await?;
        self.extract(&bytes, progress).await
    }

    pub async fn extract(
        &self,
        document: &[u8],
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<FinancialReport> {
        self.send_event(&progress, ExtractionEvent::Starting).await;

        if !looks_like_pdf(document) {
            let reason = "document is not a PDF".to_string();
            self.send_event(&progress, ExtractionEvent::Failed { reason: reason.clone() })
                .await;
            return Err(AnalyzerError::ExtractionRejected(reason));
        }

        let mut history = vec![Content::user_parts(vec![
            Part::inline(PDF_MIME, BASE64.encode(document)),
            Part::text(EXTRACTION_PROMPT),
        ])];

        self.send_event(&progress, ExtractionEvent::Requesting).await;
        info!("Requesting extraction of a {} byte document", document.len());

        let raw = match self.request(history.clone(), None).await {
            Ok(raw) => raw,
            Err(e) => {
                self.send_event(&progress, ExtractionEvent::Failed { reason: e.to_string() })
                    .await;
                return Err(e);
            }
        };
        let mut current: Value = match serde_json::from_str(&clean_json_output(&raw)) {
            Ok(value) => value,
            Err(e) => {
                let reason = format!("model returned malformed JSON: {}", e);
                self.send_event(&progress, ExtractionEvent::Failed { reason: reason.clone() })
                    .await;
                return Err(AnalyzerError::ExtractionRejected(reason));
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.send_event(&progress, ExtractionEvent::Validating { attempt })
                .await;

            let error = match self.validator.validate(&current) {
                Ok(mut report) => {
                    report.id = Uuid::new_v4().to_string();
                    report.timestamp = now_millis();
                    info!(
                        "Extracted {} after {} validation pass(es)",
                        report.display_label(),
                        attempt
                    );
                    self.send_event(&progress, ExtractionEvent::Success).await;
                    return Ok(report);
                }
                Err(e) => e,
            };

            if attempt > self.max_repair_attempts {
                return self.give_up(&progress, error).await;
            }

            warn!("Extraction attempt {} failed validation: {}", attempt, error);
            self.send_event(
                &progress,
                ExtractionEvent::Repairing {
                    attempt,
                    reason: error.to_string(),
                },
            )
            .await;

            match self.apply_patch(&mut history, &mut current, &error).await {
                Ok(()) => {}
                Err(outage @ AnalyzerError::ExtractionUnavailable(_)) => {
                    warn!("Repair attempt {} could not reach the model: {}", attempt, outage);
                    self.send_event(&progress, ExtractionEvent::Failed { reason: outage.to_string() })
                        .await;
                    return Err(outage);
                }
                Err(patch_error) => {
                    warn!("Repair attempt {} could not be applied: {}", attempt, patch_error);
                    return self.give_up(&progress, error).await;
                }
            }
        }
    }

    async fn give_up(
        &self,
        progress: &Option<Sender<ExtractionEvent>>,
        error: SchemaError,
    ) -> Result<FinancialReport> {
        self.send_event(progress, ExtractionEvent::Failed { reason: error.to_string() })
            .await;
        Err(AnalyzerError::Schema(error))
    }

    async fn request(&self, contents: Vec<Content>, system: Option<&str>) -> Result<String> {
        let request = StructuredRequest {
            contents,
            system_instruction: system.map(str::to_string),
            response_schema: match system {
                // patch answers are arrays, so only the first pass is schema-bound
                None => Some(ExtractedReport::response_schema()?),
                Some(_) => None,
            },
            thinking_budget: Some(self.thinking_budget),
            temperature: Some(self.temperature),
        };
        self.model.generate_structured(request).await
    }

    async fn apply_patch(
        &self,
        history: &mut Vec<Content>,
        current: &mut Value,
        error: &SchemaError,
    ) -> Result<()> {
        history.push(Content::model(current.to_string()));
        history.push(Content::user(repair_prompt(&error.to_string())));

        let answer = self
            .request(history.clone(), Some(REPAIR_SYSTEM_PROMPT))
            .await?;
        let patch: Patch = serde_json::from_str(&clean_json_output(&answer))?;
        debug!("Applying {} patch operation(s)", patch.0.len());

        json_patch::patch(current, &patch)?;
        Ok(())
    }

    async fn send_event(&self, sender: &Option<Sender<ExtractionEvent>>, event: ExtractionEvent) {
        if let Some(tx) = sender {
            let _ = tx.send(event).await;
        }
    }
}
