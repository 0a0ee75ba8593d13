//! # Earnings Variance
//!
//! Turns earnings disclosures (10-Q, 10-K, press releases) into structured
//! [`FinancialReport`] records, keeps them in a persistent [`ReportLibrary`],
//! and computes period-over-period variance between any two of them.
//!
//! ## Core Concepts
//!
//! - **Extraction**: a multimodal model reads a PDF and answers with JSON shaped
//!   by the report schema. The answer is validated strictly; schema failures are
//!   sent back to the model as JSON Patch repair requests.
//! - **Library**: an ordered, newest-first set of reports with one active
//!   selection, a theme flag and observer notifications. State is written to a
//!   [`KeyValueStore`] under a single key.
//! - **Comparison**: a baseline and a benchmark report produce warnings
//!   (different companies, reversed chronology), errors (missing metrics) and,
//!   when valid, a fixed set of variance rows that export as a table.
//! - **Enrichment**: grounded market context, a spoken briefing, a guidance
//!   visual and a live voice session. All optional, none required for
//!   comparison.
//!
//! ## Example
//!
//! ```rust,ignore
//! use earnings_variance::*;
//!
//! let config = AnalyzerConfig::from_env()?;
//! let client = GeminiClient::new(&config);
//! let mut engine = AnalysisEngine::open(client, FileStore::new("./data"), config).await?;
//!
//! let q2 = engine.ingest(&std::fs::read("acme_q2.pdf")?, None).await?;
//! let q3 = engine.ingest(&std::fs::read("acme_q3.pdf")?, None).await?;
//!
//! let result = engine.compare(&q2.id, &q3.id)?;
//! for row in &result.rows {
//!     println!("{}: {}", row.label(), row.display_delta());
//! }
//! ```

pub mod comparison;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod library;
pub mod llm;
pub mod metrics;
pub mod schema;
pub mod store;
pub mod utils;
pub mod validation;

pub use comparison::{
    ChronologyKey, ComparisonEngine, ComparisonIssue, ComparisonResult, ComparisonValidation,
    CriticalMetric, Metric, ReportSummary, ReportTypeFilter, ValueFormat, VarianceRow,
};
pub use config::AnalyzerConfig;
pub use engine::{AnalysisEngine, EnrichmentOutcome};
pub use error::{AnalyzerError, Result, SchemaError};
pub use export::{export_table, export_table_at, ExportTable};
pub use library::{LibrarySnapshot, LoadStatus, PersistedState, ReportLibrary, SubscriptionId, Transition};
pub use llm::{
    ExtractionClient, ExtractionEvent, GroundedSearch, ImageGeneration, SpeechSynthesis,
    UnderstandingModel,
};
#[cfg(feature = "gemini")]
pub use llm::GeminiClient;
pub use metrics::*;
pub use schema::*;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use validation::{validate, ReportValidator, Validated, ValidationWarning};
