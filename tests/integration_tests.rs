use async_trait::async_trait;
use earnings_variance::llm::{GeneratedImage, GroundedAnswer, GroundingSource, StructuredRequest};
use earnings_variance::*;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";

/// Stands in for every model capability. Extraction answers are served in order.
#[derive(Default)]
struct FakeModel {
    drafts: Mutex<VecDeque<Result<String>>>,
    fail_images: bool,
}

impl FakeModel {
    fn with_drafts(drafts: Vec<Result<String>>) -> Self {
        Self {
            drafts: Mutex::new(drafts.into()),
            fail_images: false,
        }
    }
}

#[async_trait]
impl UnderstandingModel for FakeModel {
    async fn generate_structured(&self, _request: StructuredRequest) -> Result<String> {
        self.drafts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnalyzerError::ExtractionUnavailable("exhausted".to_string())))
    }
}

#[async_trait]
impl GroundedSearch for FakeModel {
    async fn search(&self, _prompt: &str) -> Result<GroundedAnswer> {
        Ok(GroundedAnswer {
            text: Some("Shares rose after the print.".to_string()),
            sources: vec![
                GroundingSource {
                    title: Some("Newswire".to_string()),
                    uri: Some("https://news.example/acme".to_string()),
                },
                GroundingSource {
                    title: Some("Dangling".to_string()),
                    uri: None,
                },
            ],
        })
    }
}

#[async_trait]
impl SpeechSynthesis for FakeModel {
    async fn synthesize(&self, _script: &str, _voice: &str) -> Result<String> {
        Ok("AAAAAA==".to_string())
    }
}

#[async_trait]
impl ImageGeneration for FakeModel {
    async fn generate_image(&self, _prompt: &str, _aspect_ratio: &str) -> Result<GeneratedImage> {
        if self.fail_images {
            return Err(AnalyzerError::ExtractionUnavailable("image quota".to_string()));
        }
        Ok(GeneratedImage {
            mime_type: "image/png".to_string(),
            data_base64: "iVBORw0KGgo=".to_string(),
        })
    }
}

fn draft(ticker: &str, year: i32, period: &str, revenue: f64) -> Result<String> {
    Ok(json!({
        "companyName": format!("{} Holdings", ticker),
        "ticker": ticker,
        "reportType": "10-Q",
        "reportPeriod": period,
        "reportYear": year,
        "revenue": revenue,
        "revenuePrior": 800.0,
        "netIncome": 120.0,
        "netIncomePrior": 100.0,
        "eps": 1.2,
        "epsPrior": 1.0,
        "grossMargin": 41.5,
        "operatingMargin": 18.0,
        "netMargin": 12.0,
        "sentimentScore": 64,
        "expenses": [{"category": "R&D", "amount": 150.0}],
        "trends": [{"period": "Q2 23", "revenue": 950.0, "netIncome": 110.0}],
        "highlights": ["Record quarter"],
        "managementCommentary": "Demand remains healthy."
    })
    .to_string())
}

async fn engine_with(model: FakeModel) -> AnalysisEngine<FakeModel, MemoryStore> {
    AnalysisEngine::open(model, MemoryStore::new(), AnalyzerConfig::new("test-key"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_empty_library() {
    let engine = engine_with(FakeModel::default()).await;
    assert!(engine.library().list().is_empty());
    assert_eq!(engine.library().active_id(), None);
    assert_eq!(engine.library().load_status(), &LoadStatus::Empty);
    assert!(matches!(
        engine.compare("a", "b"),
        Err(AnalyzerError::UnknownReport(_))
    ));
}

#[tokio::test]
async fn test_ingest_adds_newest_first_and_persists() {
    let mut engine = engine_with(FakeModel::with_drafts(vec![
        draft("ACME", 2023, "Q2", 900.0),
        draft("ACME", 2023, "Q3", 1000.0),
    ]))
    .await;

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);
    engine
        .library_mut()
        .subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.transition.clone()));

    let q2 = engine.ingest(PDF, None).await.unwrap();
    let q3 = engine.ingest(PDF, None).await.unwrap();

    let ids: Vec<&str> = engine.library().list().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![q3.id.as_str(), q2.id.as_str()]);
    assert_eq!(engine.library().active_id(), Some(q3.id.as_str()));
    assert_eq!(q3.revenue_growth(), 25.0);
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![Transition::Added(q2.id.clone()), Transition::Added(q3.id.clone())]
    );

    let blob = engine
        .library()
        .store()
        .get(&AnalyzerConfig::new("k").storage_key)
        .await
        .unwrap()
        .unwrap();
    let state: PersistedState = serde_json::from_str(&blob).unwrap();
    assert_eq!(state.reports.len(), 2);
    assert_eq!(state.active_report_id.as_deref(), Some(q3.id.as_str()));
    assert!(!state.is_dark_mode);
}

#[tokio::test]
async fn test_failed_ingest_leaves_library_untouched() {
    let mut engine = engine_with(FakeModel::default()).await;
    let config = AnalyzerConfig::new("k").with_max_repair_attempts(0);
    let extractor = ExtractionClient::new(
        FakeModel::with_drafts(vec![
            Err(AnalyzerError::ExtractionUnavailable("503".to_string())),
            Ok(json!({"ticker": "ACME"}).to_string()),
        ]),
        &config,
    );
    engine = engine.with_extractor(extractor);

    let not_pdf = engine.ingest(b"<html></html>", None).await.unwrap_err();
    assert!(matches!(not_pdf, AnalyzerError::ExtractionRejected(_)));

    let unavailable = engine.ingest(PDF, None).await.unwrap_err();
    assert!(matches!(unavailable, AnalyzerError::ExtractionUnavailable(_)));

    let incomplete = engine.ingest(PDF, None).await.unwrap_err();
    assert!(matches!(incomplete, AnalyzerError::Schema(SchemaError::Incomplete { .. })));

    assert!(engine.library().is_empty());
    assert_eq!(engine.library().store().write_count().await, 0);
}

#[tokio::test]
async fn test_compare_and_export_round_trip() {
    let mut engine = engine_with(FakeModel::with_drafts(vec![
        draft("ACME", 2023, "Q2", 900.0),
        draft("ACME", 2023, "Q3", 1000.0),
    ]))
    .await;
    let q2 = engine.ingest(PDF, None).await.unwrap();
    let q3 = engine.ingest(PDF, None).await.unwrap();

    let result = engine.compare(&q2.id, &q3.id).unwrap();
    assert!(result.is_valid());
    assert!(result.validation.warnings.is_empty());
    let revenue = result.row(Metric::TotalRevenue).unwrap();
    assert_eq!(revenue.delta, 100.0);
    assert_eq!(revenue.direction, VarianceDirection::Good);

    let table = engine.export_table(&result).unwrap();
    let text = table.to_csv_string().unwrap();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

    assert_eq!(&records[0][1], "Comparative Variance Report");
    assert_eq!(&records[2][1], "ACME Holdings (ACME)");

    let grid: Vec<&csv::StringRecord> = records.iter().filter(|r| r.len() == 5).collect();
    assert_eq!(grid.len(), 1 + Metric::ROWS.len());
    assert_eq!(&grid[0][1], "Baseline (Q2 2023)");
    assert_eq!(&grid[0][2], "Benchmark (Q3 2023)");
    assert_eq!(&grid[1][0], "Total Revenue");
    assert_eq!(&grid[1][3], "100");
    assert_eq!(&grid[1][4], "11.11%");
    assert_eq!(&grid[2][4], "N/A");
}

#[tokio::test]
async fn test_comparison_warnings_and_errors() {
    let mut engine = engine_with(FakeModel::with_drafts(vec![
        draft("AAA", 2023, "Q3", 1000.0),
        draft("BBB", 2022, "Q2", 900.0),
    ]))
    .await;
    let baseline = engine.ingest(PDF, None).await.unwrap();
    let benchmark = engine.ingest(PDF, None).await.unwrap();

    let result = engine.compare(&baseline.id, &benchmark.id).unwrap();
    assert!(result.is_valid());
    assert_eq!(result.validation.warnings.len(), 2);
    assert!(matches!(
        result.validation.warnings[0],
        ComparisonIssue::EntityMismatch { .. }
    ));
    assert!(matches!(
        result.validation.warnings[1],
        ComparisonIssue::ReverseChronology { .. }
    ));
    assert_eq!(result.row(Metric::TotalRevenue).unwrap().delta, -100.0);

    // narrative edits go through, metric edits do not
    let mut edited = engine.library().get(&benchmark.id).unwrap().clone();
    edited.highlights.push("Restated".to_string());
    engine.library_mut().update(edited).unwrap();
    let mut stripped = engine.library().get(&benchmark.id).unwrap().clone();
    stripped.eps_prior = None;
    assert!(matches!(
        engine.library_mut().update(stripped),
        Err(AnalyzerError::ImmutableFieldMutation { .. })
    ));
}

#[tokio::test]
async fn test_missing_eps_prior_blocks_export() {
    let mut no_prior: serde_json::Value =
        serde_json::from_str(&draft("ACME", 2023, "Q3", 1000.0).unwrap()).unwrap();
    no_prior.as_object_mut().unwrap().remove("epsPrior");

    let mut engine = engine_with(FakeModel::with_drafts(vec![
        draft("ACME", 2023, "Q2", 900.0),
        Ok(no_prior.to_string()),
    ]))
    .await;
    let q2 = engine.ingest(PDF, None).await.unwrap();
    let q3 = engine.ingest(PDF, None).await.unwrap();
    assert_eq!(q3.eps_prior, None);

    let result = engine.compare(&q2.id, &q3.id).unwrap();
    assert!(!result.is_valid());
    assert!(result.rows.is_empty());
    assert_eq!(
        result.validation.errors,
        vec![ComparisonIssue::CriticalDataMissing {
            metric: CriticalMetric::EpsPrior
        }]
    );
    assert!(matches!(
        engine.export_table(&result),
        Err(AnalyzerError::ComparisonInvalid(_))
    ));
}

#[tokio::test]
async fn test_delete_active_promotes_next() {
    let mut engine = engine_with(FakeModel::with_drafts(vec![
        draft("ACME", 2023, "Q2", 900.0),
        draft("ACME", 2023, "Q3", 1000.0),
    ]))
    .await;
    let older = engine.ingest(PDF, None).await.unwrap();
    let newer = engine.ingest(PDF, None).await.unwrap();

    let removed = engine.library_mut().delete(&newer.id).await.unwrap();
    assert_eq!(removed.id, newer.id);
    assert_eq!(engine.library().len(), 1);
    assert_eq!(engine.library().active_id(), Some(older.id.as_str()));
    assert!(matches!(
        engine.library_mut().delete(&newer.id).await,
        Err(AnalyzerError::UnknownReport(_))
    ));
}

#[tokio::test]
async fn test_enrichments_are_stored_on_the_report() {
    let mut engine = engine_with(FakeModel::with_drafts(vec![draft("ACME", 2023, "Q3", 1000.0)])).await;
    let report = engine.ingest(PDF, None).await.unwrap();

    let context = engine.enrich_market_context(&report.id).await.unwrap();
    assert_eq!(context.insights.len(), 1);
    assert_eq!(context.insights[0].title, "Newswire");

    let briefing = engine.attach_audio_briefing(&report.id).await.unwrap();
    assert_eq!(briefing.voice, "Kore");

    let guidance = engine.attach_visualized_guidance(&report.id).await.unwrap();
    assert_eq!(guidance.mime_type, "image/png");

    let stored = engine.library().get(&report.id).unwrap();
    assert_eq!(stored.market_context.as_ref(), Some(&context));
    assert_eq!(stored.audio_briefing.as_ref(), Some(&briefing));
    assert_eq!(stored.visualized_guidance.as_ref(), Some(&guidance));
    assert_eq!(stored.revenue, report.revenue);
    assert!(!engine.library().is_dirty());

    assert!(matches!(
        engine.enrich_market_context("missing").await,
        Err(AnalyzerError::UnknownReport(_))
    ));
}

#[tokio::test]
async fn test_enrich_all_keeps_partial_successes() {
    let model = FakeModel {
        drafts: Mutex::new(VecDeque::from(vec![draft("ACME", 2023, "Q3", 1000.0)])),
        fail_images: true,
    };
    let mut engine = engine_with(model).await;
    let report = engine.ingest(PDF, None).await.unwrap();

    let outcome = engine.enrich_all(&report.id).await.unwrap();
    assert!(outcome.market_context.is_ok());
    assert!(outcome.audio_briefing.is_ok());
    assert!(outcome.visualized_guidance.is_err());
    assert!(!outcome.all_succeeded());

    let stored = engine.library().get(&report.id).unwrap();
    assert!(stored.market_context.is_some());
    assert!(stored.audio_briefing.is_some());
    assert!(stored.visualized_guidance.is_none());
}

#[tokio::test]
async fn test_file_store_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let first_id = {
        let mut engine = AnalysisEngine::open(
            FakeModel::with_drafts(vec![draft("ACME", 2023, "Q3", 1000.0)]),
            FileStore::new(dir.path()),
            AnalyzerConfig::new("k"),
        )
        .await?;
        let report = engine.ingest(PDF, None).await?;
        engine.library_mut().set_dark_mode(true);
        engine.library_mut().flush().await?;
        report.id
    };

    let engine = AnalysisEngine::open(
        FakeModel::default(),
        FileStore::new(dir.path()),
        AnalyzerConfig::new("k"),
    )
    .await?;
    assert_eq!(
        engine.library().load_status(),
        &LoadStatus::Restored { reports: 1 }
    );
    assert_eq!(engine.library().active_id(), Some(first_id.as_str()));
    assert!(engine.library().is_dark_mode());
    assert_eq!(engine.library().list()[0].expenses[0].category, "R&D");
    Ok(())
}

#[tokio::test]
async fn test_report_type_candidates() {
    let mut annual: serde_json::Value =
        serde_json::from_str(&draft("ACME", 2023, "FY", 4000.0).unwrap()).unwrap();
    annual["reportType"] = json!("10-K");

    let mut engine = engine_with(FakeModel::with_drafts(vec![
        draft("ACME", 2023, "Q3", 1000.0),
        Ok(annual.to_string()),
    ]))
    .await;
    engine.ingest(PDF, None).await.unwrap();
    let annual_report = engine.ingest(PDF, None).await.unwrap();

    let annual_only = engine.candidates(ReportTypeFilter::Only(ReportType::TenK));
    assert_eq!(annual_only.len(), 1);
    assert_eq!(annual_only[0].id, annual_report.id);
    assert_eq!(engine.candidates(ReportTypeFilter::All).len(), 2);
    assert_eq!(engine.library().search("acme").len(), 2);
    assert!(engine.library().search("zzz").is_empty());
}
