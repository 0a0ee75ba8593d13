//! Tabular export of a comparison, ready for any CSV writer.

use chrono::{DateTime, Utc};
use std::io;

use crate::comparison::{ComparisonResult, ReportSummary, ValueFormat};
use crate::error::{AnalyzerError, Result};

pub const ANALYSIS_TYPE: &str = "Comparative Variance Report";

/// Index of the column header row inside [`ExportTable::rows`].
pub const HEADER_ROW: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn header(&self) -> Option<&[String]> {
        self.rows.get(HEADER_ROW).map(Vec::as_slice)
    }

    /// One row per variance metric, in comparison order.
    pub fn metric_rows(&self) -> &[Vec<String>] {
        self.rows.get(HEADER_ROW + 1..).unwrap_or(&[])
    }

    /// Writes the table as CSV. Rows differ in width, so the writer is flexible.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

fn entity_label(summary: &ReportSummary) -> String {
    format!("{} ({})", summary.company_name, summary.ticker)
}

fn period_label(summary: &ReportSummary) -> String {
    format!("{} {}", summary.report_period, summary.report_year)
}

/// Suggested file name for a saved export.
pub fn file_name(result: &ComparisonResult) -> String {
    format!("variance_analysis_{}.csv", result.baseline.ticker)
}

pub fn export_table(result: &ComparisonResult) -> Result<ExportTable> {
    export_table_at(result, Utc::now())
}

/// Builds the export with a fixed export date.
pub fn export_table_at(result: &ComparisonResult, exported_at: DateTime<Utc>) -> Result<ExportTable> {
    if !result.is_valid() {
        return Err(AnalyzerError::ComparisonInvalid(
            result
                .validation
                .errors
                .iter()
                .map(ToString::to_string)
                .collect(),
        ));
    }

    let mut rows: Vec<Vec<String>> = vec![
        vec!["Analysis Type".to_string(), ANALYSIS_TYPE.to_string()],
        vec![
            "Export Date".to_string(),
            exported_at.format("%Y-%m-%d").to_string(),
        ],
        vec![
            "Entity 1 (Baseline)".to_string(),
            entity_label(&result.baseline),
        ],
        vec![
            "Entity 2 (Benchmark)".to_string(),
            entity_label(&result.benchmark),
        ],
        vec![String::new()],
        vec![
            "Metric".to_string(),
            format!("Baseline ({})", period_label(&result.baseline)),
            format!("Benchmark ({})", period_label(&result.benchmark)),
            "Delta (Abs)".to_string(),
            "Delta (%)".to_string(),
        ],
    ];

    for row in &result.rows {
        let percent = match row.metric.format() {
            ValueFormat::Percent => "N/A".to_string(),
            ValueFormat::Currency | ValueFormat::Raw => format!("{:.2}%", row.percent_change),
        };
        rows.push(vec![
            row.label().to_string(),
            row.baseline.to_string(),
            row.benchmark.to_string(),
            row.delta.to_string(),
            percent,
        ]);
    }

    Ok(ExportTable { rows })
}
