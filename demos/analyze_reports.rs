use dotenv::dotenv;
use earnings_variance::{
    AnalysisEngine, AnalyzerConfig, ExtractionEvent, FileStore, GeminiClient,
};
use std::error::Error;
use std::path::PathBuf;
use tokio::sync::mpsc;

// Usage: analyze_reports <baseline.pdf> <benchmark.pdf> [library dir]
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (baseline_path, benchmark_path) = match (args.next(), args.next()) {
        (Some(b), Some(t)) => (PathBuf::from(b), PathBuf::from(t)),
        _ => return Err("usage: analyze_reports <baseline.pdf> <benchmark.pdf> [library dir]".into()),
    };
    let library_dir = args.next().unwrap_or_else(|| "./library".to_string());

    let config = AnalyzerConfig::from_env()?;
    let client = GeminiClient::new(&config);
    let mut engine = AnalysisEngine::open(client, FileStore::new(&library_dir), config).await?;
    println!(
        "📚 Library at {} holds {} report(s)",
        library_dir,
        engine.library().len()
    );

    let mut ids = Vec::new();
    for path in [&baseline_path, &benchmark_path] {
        let (tx, mut rx) = mpsc::channel(32);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ExtractionEvent::Starting => println!("🚀 Starting extraction"),
                    ExtractionEvent::Requesting => println!("🤖 Waiting for the model..."),
                    ExtractionEvent::Validating { attempt } => {
                        println!("🔍 Validating (pass {})", attempt)
                    }
                    ExtractionEvent::Repairing { attempt, reason } => {
                        println!("🔧 Repair {}: {}", attempt, reason)
                    }
                    ExtractionEvent::Success => println!("✅ Extracted"),
                    ExtractionEvent::Failed { reason } => println!("❌ Failed: {}", reason),
                }
            }
        });

        let report = engine.ingest_path(path, Some(tx)).await?;
        printer.await?;
        println!(
            "   {} | revenue growth {:.2}% | sentiment {} ({})\n",
            report.display_label(),
            report.revenue_growth(),
            report.sentiment_score,
            report.sentiment_label()
        );
        ids.push(report.id);
    }

    let result = engine.compare(&ids[0], &ids[1])?;
    for warning in &result.validation.warnings {
        println!("⚠️  {}", warning);
    }
    for error in &result.validation.errors {
        println!("⛔ {}", error);
    }
    if !result.is_valid() {
        return Ok(());
    }

    println!("\n{:<24} {:>14} {:>14} {:>14}", "Metric", "Baseline", "Benchmark", "Delta");
    for row in &result.rows {
        println!(
            "{:<24} {:>14} {:>14} {:>14}",
            row.label(),
            row.display_baseline(),
            row.display_benchmark(),
            row.display_delta()
        );
    }

    let table = engine.export_table(&result)?;
    let file_name = earnings_variance::export::file_name(&result);
    table.write_csv(std::fs::File::create(&file_name)?)?;
    println!("\n💾 Saved {}", file_name);

    match engine.enrich_market_context(&ids[1]).await {
        Ok(context) => {
            println!("\n📰 {}", context.summary);
            for insight in &context.insights {
                println!("   - {} ({})", insight.title, insight.uri);
            }
        }
        Err(e) => println!("\n📰 Market context unavailable: {}", e),
    }

    Ok(())
}
