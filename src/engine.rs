use log::{info, warn};
use std::path::Path;
use tokio::sync::mpsc::Sender;

use crate::comparison::{ComparisonEngine, ComparisonResult, ReportTypeFilter};
use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, Result};
use crate::export::{export_table, ExportTable};
use crate::library::ReportLibrary;
use crate::llm::capabilities::{GroundedSearch, ImageGeneration, SpeechSynthesis, UnderstandingModel};
use crate::llm::enrichment::{audio_briefing, market_context, visualize_guidance};
use crate::llm::extractor::ExtractionClient;
use crate::llm::live::{LiveCallbacks, LiveSession, LiveTransport};
use crate::llm::types::ExtractionEvent;
use crate::schema::{AudioBriefing, FinancialReport, MarketContext, VisualizedGuidance};
use crate::store::KeyValueStore;

/// Result of [`AnalysisEngine::enrich_all`]; each enrichment succeeds or fails
/// on its own.
#[derive(Debug)]
pub struct EnrichmentOutcome {
    pub market_context: Result<()>,
    pub audio_briefing: Result<()>,
    pub visualized_guidance: Result<()>,
}

impl EnrichmentOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.market_context.is_ok() && self.audio_briefing.is_ok() && self.visualized_guidance.is_ok()
    }
}

/// The surface a presentation layer talks to: extraction feeding a persistent
/// library, plus comparison and export over what the library holds.
pub struct AnalysisEngine<M, S: KeyValueStore> {
    extractor: ExtractionClient<M>,
    library: ReportLibrary<S>,
    comparison: ComparisonEngine,
    config: AnalyzerConfig,
}

impl<M, S> AnalysisEngine<M, S>
where
    M: UnderstandingModel,
    S: KeyValueStore,
{
    /// Restores the library from `store` (leniently) and wires the model in.
    pub async fn open(model: M, store: S, config: AnalyzerConfig) -> Result<Self> {
        let library = ReportLibrary::load(store, config.storage_key.clone()).await?;
        Ok(Self::with_library(model, library, config))
    }

    pub fn with_library(model: M, library: ReportLibrary<S>, config: AnalyzerConfig) -> Self {
        Self {
            extractor: ExtractionClient::new(model, &config),
            library,
            comparison: ComparisonEngine::new(),
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: ExtractionClient<M>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn library(&self) -> &ReportLibrary<S> {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut ReportLibrary<S> {
        &mut self.library
    }

    fn model(&self) -> &M {
        self.extractor.model()
    }

    /// Extracts a PDF and adds the result at the head of the library, making it
    /// active. Extraction failures leave the library untouched.
    pub async fn ingest(
        &mut self,
        pdf: &[u8],
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<FinancialReport> {
        let report = self.extractor.extract(pdf, progress).await?;
        self.library.add(report.clone()).await?;
        Ok(report)
    }

    pub async fn ingest_path(
        &mut self,
        path: &Path,
        progress: Option<Sender<ExtractionEvent>>,
    ) -> Result<FinancialReport> {
        let report = self.extractor.extract_path(path, progress).await?;
        self.library.add(report.clone()).await?;
        Ok(report)
    }

    pub fn candidates(&self, filter: ReportTypeFilter) -> Vec<&FinancialReport> {
        filter.apply(self.library.list())
    }

    pub fn compare(&self, baseline_id: &str, benchmark_id: &str) -> Result<ComparisonResult> {
        self.comparison
            .compare(self.library.list(), baseline_id, benchmark_id)
    }

    pub fn compare_filtered(
        &self,
        filter: ReportTypeFilter,
        baseline_id: &str,
        benchmark_id: &str,
    ) -> Result<ComparisonResult> {
        self.comparison
            .compare_filtered(self.library.list(), filter, baseline_id, benchmark_id)
    }

    pub fn export_table(&self, result: &ComparisonResult) -> Result<ExportTable> {
        export_table(result)
    }

    fn report(&self, id: &str) -> Result<FinancialReport> {
        self.library
            .get(id)
            .cloned()
            .ok_or_else(|| AnalyzerError::UnknownReport(id.to_string()))
    }

    /// Stores an enrichment on the current copy of the report and writes it out.
    async fn attach<F>(&mut self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut FinancialReport),
    {
        let mut report = self.report(id)?;
        apply(&mut report);
        self.library.update(report)?;
        self.library.flush().await?;
        Ok(())
    }

    /// Opens a voice session about one stored report over a host transport.
    pub async fn live_analyst<T, C>(
        &self,
        transport: T,
        report_id: &str,
        callbacks: &mut C,
    ) -> Result<LiveSession<T>>
    where
        T: LiveTransport,
        C: LiveCallbacks,
    {
        let report = self.report(report_id)?;
        LiveSession::connect(transport, &report, &self.config, callbacks).await
    }
}

impl<M, S> AnalysisEngine<M, S>
where
    M: UnderstandingModel + GroundedSearch,
    S: KeyValueStore,
{
    pub async fn enrich_market_context(&mut self, id: &str) -> Result<MarketContext> {
        let report = self.report(id)?;
        let context = market_context(self.model(), &report.ticker, &report.company_name).await?;
        let stored = context.clone();
        self.attach(id, move |r| r.market_context = Some(stored)).await?;
        Ok(context)
    }
}

impl<M, S> AnalysisEngine<M, S>
where
    M: UnderstandingModel + SpeechSynthesis,
    S: KeyValueStore,
{
    pub async fn attach_audio_briefing(&mut self, id: &str) -> Result<AudioBriefing> {
        let report = self.report(id)?;
        let briefing = audio_briefing(self.model(), &report, &self.config.voice).await?;
        let stored = briefing.clone();
        self.attach(id, move |r| r.audio_briefing = Some(stored)).await?;
        Ok(briefing)
    }
}

impl<M, S> AnalysisEngine<M, S>
where
    M: UnderstandingModel + ImageGeneration,
    S: KeyValueStore,
{
    pub async fn attach_visualized_guidance(&mut self, id: &str) -> Result<VisualizedGuidance> {
        let report = self.report(id)?;
        let guidance = visualize_guidance(self.model(), &report).await?;
        let stored = guidance.clone();
        self.attach(id, move |r| r.visualized_guidance = Some(stored)).await?;
        Ok(guidance)
    }
}

impl<M, S> AnalysisEngine<M, S>
where
    M: UnderstandingModel + GroundedSearch + SpeechSynthesis + ImageGeneration,
    S: KeyValueStore,
{
    /// Runs every enrichment concurrently and stores whichever succeed in a
    /// single write.
    pub async fn enrich_all(&mut self, id: &str) -> Result<EnrichmentOutcome> {
        let report = self.report(id)?;
        let model = self.model();
        let (context, briefing, guidance) = futures::join!(
            market_context(model, &report.ticker, &report.company_name),
            audio_briefing(model, &report, &self.config.voice),
            visualize_guidance(model, &report),
        );

        let mut updated = report.clone();
        let market_context = context.map(|c| updated.market_context = Some(c));
        let audio_briefing = briefing.map(|b| updated.audio_briefing = Some(b));
        let visualized_guidance = guidance.map(|g| updated.visualized_guidance = Some(g));

        let outcome = EnrichmentOutcome {
            market_context,
            audio_briefing,
            visualized_guidance,
        };
        for failure in [
            &outcome.market_context,
            &outcome.audio_briefing,
            &outcome.visualized_guidance,
        ]
        .into_iter()
        .filter_map(|r| r.as_ref().err())
        {
            warn!("Enrichment of {} failed: {}", report.display_label(), failure);
        }

        if updated != report {
            self.library.update(updated)?;
            self.library.flush().await?;
            info!("Stored enrichments for {}", report.display_label());
        }
        Ok(outcome)
    }
}
