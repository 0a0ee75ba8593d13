use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AnalyzerError, Result};
use crate::metrics::{format_currency, variance_direction, VarianceDirection};
use crate::schema::{FinancialReport, ReportType};
use crate::utils::period_ordinal;

/// `(reportYear, periodOrdinal)`, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChronologyKey {
    pub year: i32,
    pub ordinal: u32,
}

impl ChronologyKey {
    pub fn of(report: &FinancialReport) -> Self {
        Self {
            year: report.report_year,
            ordinal: period_ordinal(&report.report_period),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CriticalMetric {
    Revenue,
    NetIncome,
    Eps,
    RevenuePrior,
    NetIncomePrior,
    EpsPrior,
}

impl CriticalMetric {
    pub const ALL: [CriticalMetric; 6] = [
        CriticalMetric::Revenue,
        CriticalMetric::NetIncome,
        CriticalMetric::Eps,
        CriticalMetric::RevenuePrior,
        CriticalMetric::NetIncomePrior,
        CriticalMetric::EpsPrior,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            CriticalMetric::Revenue => "revenue",
            CriticalMetric::NetIncome => "netIncome",
            CriticalMetric::Eps => "eps",
            CriticalMetric::RevenuePrior => "revenuePrior",
            CriticalMetric::NetIncomePrior => "netIncomePrior",
            CriticalMetric::EpsPrior => "epsPrior",
        }
    }

    fn value_of(&self, report: &FinancialReport) -> Option<f64> {
        match self {
            CriticalMetric::Revenue => Some(report.revenue),
            CriticalMetric::NetIncome => Some(report.net_income),
            CriticalMetric::Eps => Some(report.eps),
            CriticalMetric::RevenuePrior => Some(report.revenue_prior),
            CriticalMetric::NetIncomePrior => report.net_income_prior,
            CriticalMetric::EpsPrior => report.eps_prior,
        }
    }

    fn is_usable(&self, report: &FinancialReport) -> bool {
        self.value_of(report).is_some_and(f64::is_finite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ComparisonIssue {
    EntityMismatch {
        baseline_ticker: String,
        baseline_company: String,
        benchmark_ticker: String,
        benchmark_company: String,
    },
    ReverseChronology {
        baseline: ChronologyKey,
        benchmark: ChronologyKey,
    },
    CriticalDataMissing {
        metric: CriticalMetric,
    },
}

impl fmt::Display for ComparisonIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonIssue::EntityMismatch {
                baseline_ticker,
                baseline_company,
                benchmark_ticker,
                benchmark_company,
            } => write!(
                f,
                "Entity Mismatch: comparing {} ({}) with {} ({}). Metric variances may not reflect organic performance trends.",
                baseline_ticker, baseline_company, benchmark_ticker, benchmark_company
            ),
            ComparisonIssue::ReverseChronology { .. } => f.write_str(
                "Reverse Chronology: the Benchmark period is older than the Baseline. Percentage changes reflect historical contraction rather than forward growth.",
            ),
            ComparisonIssue::CriticalDataMissing { metric } => write!(
                f,
                "Critical data point missing: {} is required for variance modeling.",
                metric.field_name()
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonValidation {
    pub errors: Vec<ComparisonIssue>,
    pub warnings: Vec<ComparisonIssue>,
}

impl ComparisonValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Currency,
    Percent,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    TotalRevenue,
    RevenueGrowth,
    NetIncome,
    DilutedEps,
    GrossMargin,
    OperatingMargin,
    NetMargin,
}

impl Metric {
    /// Row order of every comparison.
    pub const ROWS: [Metric; 7] = [
        Metric::TotalRevenue,
        Metric::RevenueGrowth,
        Metric::NetIncome,
        Metric::DilutedEps,
        Metric::GrossMargin,
        Metric::OperatingMargin,
        Metric::NetMargin,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::TotalRevenue => "Total Revenue",
            Metric::RevenueGrowth => "Revenue Growth (YoY)",
            Metric::NetIncome => "Net Income",
            Metric::DilutedEps => "Diluted EPS",
            Metric::GrossMargin => "Gross Margin",
            Metric::OperatingMargin => "Operating Margin",
            Metric::NetMargin => "Net Margin",
        }
    }

    pub fn format(&self) -> ValueFormat {
        match self {
            Metric::TotalRevenue | Metric::NetIncome => ValueFormat::Currency,
            Metric::DilutedEps => ValueFormat::Raw,
            Metric::RevenueGrowth
            | Metric::GrossMargin
            | Metric::OperatingMargin
            | Metric::NetMargin => ValueFormat::Percent,
        }
    }

    /// Rows where a decrease is the good outcome. None of the fixed rows are
    /// cost rows today.
    pub fn invert(&self) -> bool {
        false
    }

    fn value_of(&self, report: &FinancialReport) -> f64 {
        match self {
            Metric::TotalRevenue => report.revenue,
            Metric::RevenueGrowth => report.revenue_growth(),
            Metric::NetIncome => report.net_income,
            Metric::DilutedEps => report.eps,
            Metric::GrossMargin => report.gross_margin,
            Metric::OperatingMargin => report.operating_margin,
            Metric::NetMargin => report.net_margin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceRow {
    pub metric: Metric,
    pub baseline: f64,
    pub benchmark: f64,
    /// `benchmark - baseline`
    pub delta: f64,
    /// `delta / |baseline| * 100`, or 0 when the baseline is 0.
    pub percent_change: f64,
    pub direction: VarianceDirection,
}

impl VarianceRow {
    pub fn new(metric: Metric, baseline: f64, benchmark: f64) -> Self {
        Self::with_invert(metric, baseline, benchmark, metric.invert())
    }

    pub fn with_invert(metric: Metric, baseline: f64, benchmark: f64, invert: bool) -> Self {
        let delta = benchmark - baseline;
        let percent_change = if baseline.abs() > 0.0 {
            delta / baseline.abs() * 100.0
        } else {
            0.0
        };
        Self {
            metric,
            baseline,
            benchmark,
            delta,
            percent_change,
            direction: variance_direction(delta, invert),
        }
    }

    pub fn label(&self) -> &'static str {
        self.metric.label()
    }

    pub fn is_flat(&self) -> bool {
        self.direction == VarianceDirection::Flat
    }

    /// Percent-of-percent is not meaningful, so percent rows carry none.
    pub fn has_percent_change(&self) -> bool {
        self.metric.format() != ValueFormat::Percent
    }

    pub fn display_baseline(&self) -> String {
        display_value(self.metric.format(), self.baseline)
    }

    pub fn display_benchmark(&self) -> String {
        display_value(self.metric.format(), self.benchmark)
    }

    pub fn display_delta(&self) -> String {
        if self.is_flat() {
            return "Flat".to_string();
        }
        match self.metric.format() {
            ValueFormat::Currency => format_currency(self.delta, true, 2),
            ValueFormat::Percent => format!("{:.2}%", self.delta.abs()),
            ValueFormat::Raw => format!("{:.2}", self.delta.abs()),
        }
    }
}

fn display_value(format: ValueFormat, value: f64) -> String {
    match format {
        ValueFormat::Currency => format_currency(value, true, 2),
        ValueFormat::Percent => format!("{:.2}%", value),
        ValueFormat::Raw if value < 0.0 => format!("-${:.2}", value.abs()),
        ValueFormat::Raw => format!("${:.2}", value),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: String,
    pub company_name: String,
    pub ticker: String,
    pub report_type: ReportType,
    pub report_period: String,
    pub report_year: i32,
}

impl From<&FinancialReport> for ReportSummary {
    fn from(report: &FinancialReport) -> Self {
        Self {
            id: report.id.clone(),
            company_name: report.company_name.clone(),
            ticker: report.ticker.clone(),
            report_type: report.report_type.clone(),
            report_period: report.report_period.clone(),
            report_year: report.report_year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub baseline: ReportSummary,
    pub benchmark: ReportSummary,
    pub validation: ComparisonValidation,
    /// Empty unless the validation produced no errors.
    pub rows: Vec<VarianceRow>,
}

impl ComparisonResult {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid()
    }

    pub fn row(&self, metric: Metric) -> Option<&VarianceRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReportTypeFilter {
    #[default]
    All,
    Only(ReportType),
}

impl ReportTypeFilter {
    pub fn matches(&self, report: &FinancialReport) -> bool {
        match self {
            ReportTypeFilter::All => true,
            ReportTypeFilter::Only(kind) => report.report_type == *kind,
        }
    }

    /// Narrows a candidate pool without touching the reports themselves.
    pub fn apply<'a>(&self, reports: &'a [FinancialReport]) -> Vec<&'a FinancialReport> {
        reports.iter().filter(|r| self.matches(r)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonEngine;

impl ComparisonEngine {
    pub fn new() -> Self {
        Self
    }

    /// Looks both ids up in `pool` and compares them.
    pub fn compare(
        &self,
        pool: &[FinancialReport],
        baseline_id: &str,
        benchmark_id: &str,
    ) -> Result<ComparisonResult> {
        let find = |id: &str| {
            pool.iter()
                .find(|r| r.id == id)
                .ok_or_else(|| AnalyzerError::UnknownReport(id.to_string()))
        };
        let baseline = find(baseline_id)?;
        let benchmark = find(benchmark_id)?;
        Ok(self.compare_reports(baseline, benchmark))
    }

    /// Like [`ComparisonEngine::compare`], restricted to reports the filter admits.
    pub fn compare_filtered(
        &self,
        pool: &[FinancialReport],
        filter: ReportTypeFilter,
        baseline_id: &str,
        benchmark_id: &str,
    ) -> Result<ComparisonResult> {
        let candidates: Vec<FinancialReport> =
            filter.apply(pool).into_iter().cloned().collect();
        self.compare(&candidates, baseline_id, benchmark_id)
    }

    pub fn compare_reports(
        &self,
        baseline: &FinancialReport,
        benchmark: &FinancialReport,
    ) -> ComparisonResult {
        let validation = self.validate(baseline, benchmark);
        let rows = if validation.is_valid() {
            Metric::ROWS
                .iter()
                .map(|m| VarianceRow::new(*m, m.value_of(baseline), m.value_of(benchmark)))
                .collect()
        } else {
            Vec::new()
        };

        ComparisonResult {
            baseline: ReportSummary::from(baseline),
            benchmark: ReportSummary::from(benchmark),
            validation,
            rows,
        }
    }

    pub fn validate(
        &self,
        baseline: &FinancialReport,
        benchmark: &FinancialReport,
    ) -> ComparisonValidation {
        let mut validation = ComparisonValidation::default();

        if baseline.ticker != benchmark.ticker {
            validation.warnings.push(ComparisonIssue::EntityMismatch {
                baseline_ticker: baseline.ticker.clone(),
                baseline_company: baseline.company_name.clone(),
                benchmark_ticker: benchmark.ticker.clone(),
                benchmark_company: benchmark.company_name.clone(),
            });
        }

        let baseline_key = ChronologyKey::of(baseline);
        let benchmark_key = ChronologyKey::of(benchmark);
        if benchmark_key < baseline_key {
            validation.warnings.push(ComparisonIssue::ReverseChronology {
                baseline: baseline_key,
                benchmark: benchmark_key,
            });
        }

        for metric in CriticalMetric::ALL {
            if !metric.is_usable(baseline) || !metric.is_usable(benchmark) {
                validation
                    .errors
                    .push(ComparisonIssue::CriticalDataMissing { metric });
            }
        }

        validation
    }
}

/// The first two candidates, as preselected by the comparison view.
pub fn default_pair(candidates: &[&FinancialReport]) -> (Option<String>, Option<String>) {
    (
        candidates.first().map(|r| r.id.clone()),
        candidates.get(1).map(|r| r.id.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn report(id: &str, ticker: &str, year: i32, period: &str) -> FinancialReport {
        FinancialReport {
            id: id.to_string(),
            timestamp: 0,
            company_name: format!("{} Corp", ticker),
            ticker: ticker.to_string(),
            report_type: ReportType::TenQ,
            report_period: period.to_string(),
            report_year: year,
            revenue: 1000.0,
            revenue_prior: 800.0,
            net_income: 100.0,
            net_income_prior: Some(80.0),
            eps: 1.0,
            eps_prior: Some(0.8),
            gross_margin: 40.0,
            operating_margin: 20.0,
            net_margin: 10.0,
            sentiment_score: 50,
            expenses: vec![],
            trends: vec![],
            highlights: vec![],
            management_commentary: String::new(),
            market_context: None,
            audio_briefing: None,
            visualized_guidance: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_variance_row_math() {
        let row = VarianceRow::new(Metric::TotalRevenue, 1000.0, 1250.0);
        assert_eq!(row.delta, 250.0);
        assert_eq!(row.percent_change, 25.0);
        assert_eq!(row.direction, VarianceDirection::Good);

        let row = VarianceRow::new(Metric::NetIncome, -200.0, -300.0);
        assert_eq!(row.delta, -100.0);
        assert_eq!(row.percent_change, -50.0);
        assert_eq!(row.direction, VarianceDirection::Bad);

        let zero_base = VarianceRow::new(Metric::NetIncome, 0.0, 10.0);
        assert_eq!(zero_base.percent_change, 0.0);

        let flat = VarianceRow::new(Metric::GrossMargin, 40.0, 40.0005);
        assert!(flat.is_flat());
        assert_eq!(flat.display_delta(), "Flat");
    }

    #[test]
    fn test_inverted_row_direction() {
        let row = VarianceRow::with_invert(Metric::TotalRevenue, 100.0, 120.0, true);
        assert_eq!(row.direction, VarianceDirection::Bad);
    }

    #[test]
    fn test_row_display() {
        let eps = VarianceRow::new(Metric::DilutedEps, 1.5, 1.25);
        assert_eq!(eps.display_baseline(), "$1.50");
        assert_eq!(eps.display_delta(), "0.25");

        let margin = VarianceRow::new(Metric::GrossMargin, 40.0, 42.5);
        assert_eq!(margin.display_benchmark(), "42.50%");
        assert_eq!(margin.display_delta(), "2.50%");
        assert!(!margin.has_percent_change());

        let revenue = VarianceRow::new(Metric::TotalRevenue, 2.5e9, 3.0e9);
        assert_eq!(revenue.display_baseline(), "$2.50B");
        assert_eq!(revenue.display_delta(), "$500.00M");
    }

    #[test]
    fn test_fixed_row_set() {
        let engine = ComparisonEngine::new();
        let result = engine.compare_reports(
            &report("a", "ACME", 2023, "Q1"),
            &report("b", "ACME", 2023, "Q2"),
        );
        assert!(result.is_valid());
        assert!(result.validation.warnings.is_empty());
        let metrics: Vec<Metric> = result.rows.iter().map(|r| r.metric).collect();
        assert_eq!(metrics, Metric::ROWS.to_vec());
    }

    #[test]
    fn test_revenue_growth_row_uses_each_sides_prior() {
        let baseline = report("a", "ACME", 2023, "Q1");
        let mut benchmark = report("b", "ACME", 2023, "Q2");
        benchmark.revenue = 1200.0;
        benchmark.revenue_prior = 1000.0;

        let result = ComparisonEngine::new().compare_reports(&baseline, &benchmark);
        let growth_row = result.row(Metric::RevenueGrowth).unwrap();
        assert_eq!(growth_row.baseline, 25.0);
        assert_eq!(growth_row.benchmark, 20.0);
        assert_eq!(growth_row.delta, -5.0);
    }

    #[test]
    fn test_reverse_chronology_warning() {
        let baseline = report("a", "ACME", 2023, "Q3");
        let mut benchmark = report("b", "ACME", 2022, "Q2");
        benchmark.revenue = 900.0;

        let result = ComparisonEngine::new().compare_reports(&baseline, &benchmark);
        assert!(result.is_valid());
        assert_eq!(
            result.validation.warnings,
            vec![ComparisonIssue::ReverseChronology {
                baseline: ChronologyKey { year: 2023, ordinal: 3 },
                benchmark: ChronologyKey { year: 2022, ordinal: 2 },
            }]
        );
        assert_eq!(result.row(Metric::TotalRevenue).unwrap().delta, -100.0);
    }

    #[test]
    fn test_annual_label_sorts_before_quarters() {
        let engine = ComparisonEngine::new();
        let fy = report("a", "ACME", 2023, "FY");
        let q1 = report("b", "ACME", 2023, "Q1");
        assert!(engine.validate(&fy, &q1).warnings.is_empty());
        assert_eq!(engine.validate(&q1, &fy).warnings.len(), 1);
    }

    #[test]
    fn test_entity_mismatch_warning() {
        let mut baseline = report("a", "AAA", 2023, "Q1");
        baseline.eps_prior = None;
        let benchmark = report("b", "BBB", 2023, "Q2");

        let validation = ComparisonEngine::new().validate(&baseline, &benchmark);
        assert!(matches!(
            validation.warnings[0],
            ComparisonIssue::EntityMismatch { ref baseline_ticker, .. } if baseline_ticker == "AAA"
        ));
        assert!(!validation.is_valid());
    }

    #[test]
    fn test_missing_eps_prior_suppresses_rows() {
        let baseline = report("a", "ACME", 2023, "Q1");
        let mut benchmark = report("b", "ACME", 2023, "Q2");
        benchmark.eps_prior = None;

        let result = ComparisonEngine::new().compare_reports(&baseline, &benchmark);
        assert!(!result.is_valid());
        assert!(result.rows.is_empty());
        assert_eq!(
            result.validation.errors,
            vec![ComparisonIssue::CriticalDataMissing {
                metric: CriticalMetric::EpsPrior
            }]
        );
        assert!(result.validation.errors[0].to_string().contains("epsPrior"));
    }

    #[test]
    fn test_non_finite_metric_is_missing() {
        let mut baseline = report("a", "ACME", 2023, "Q1");
        baseline.revenue = f64::NAN;
        let benchmark = report("b", "ACME", 2023, "Q2");
        let validation = ComparisonEngine::new().validate(&baseline, &benchmark);
        assert_eq!(
            validation.errors,
            vec![ComparisonIssue::CriticalDataMissing {
                metric: CriticalMetric::Revenue
            }]
        );
    }

    #[test]
    fn test_unknown_ids() {
        let engine = ComparisonEngine::new();
        let pool = vec![report("a", "ACME", 2023, "Q1")];
        assert!(matches!(
            engine.compare(&pool, "a", "zzz"),
            Err(AnalyzerError::UnknownReport(id)) if id == "zzz"
        ));
        assert!(matches!(
            engine.compare(&[], "a", "b"),
            Err(AnalyzerError::UnknownReport(_))
        ));
    }

    #[test]
    fn test_report_type_filter() {
        let mut annual = report("k", "ACME", 2023, "FY");
        annual.report_type = ReportType::TenK;
        let pool = vec![
            report("q1", "ACME", 2023, "Q1"),
            annual,
            report("q2", "ACME", 2023, "Q2"),
        ];

        let quarterly = ReportTypeFilter::Only(ReportType::TenQ).apply(&pool);
        let ids: Vec<&str> = quarterly.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2"]);
        assert_eq!(ReportTypeFilter::All.apply(&pool).len(), 3);
        assert_eq!(
            default_pair(&quarterly),
            (Some("q1".to_string()), Some("q2".to_string()))
        );

        let engine = ComparisonEngine::new();
        assert!(engine
            .compare_filtered(&pool, ReportTypeFilter::Only(ReportType::TenQ), "q1", "k")
            .is_err());
        assert!(engine
            .compare_filtered(&pool, ReportTypeFilter::All, "q1", "k")
            .is_ok());
    }

    #[test]
    fn test_filter_matches_custom_report_type() {
        let mut current = report("8k", "ACME", 2023, "Q3");
        current.report_type = ReportType::from_label("8-K");
        let pool = vec![report("q3", "ACME", 2023, "Q3"), current];

        let filter = ReportTypeFilter::Only(ReportType::Other("8-K".to_string()));
        let ids: Vec<&str> = filter.apply(&pool).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["8k"]);
        assert!(ReportTypeFilter::Only(ReportType::default()).apply(&pool).is_empty());
    }

    #[test]
    fn test_swapping_sides_negates_deltas() {
        let engine = ComparisonEngine::new();
        let mut earlier = report("a", "ACME", 2023, "Q2");
        earlier.revenue = 1234.5;
        earlier.net_income = -40.0;
        earlier.eps = 0.37;
        earlier.gross_margin = 38.2;
        let mut later = report("b", "BETA", 2023, "Q3");
        later.revenue = 987.25;
        later.revenue_prior = 900.0;
        later.net_income = 55.5;
        later.eps = 0.61;
        later.operating_margin = 12.75;

        let forward = engine.compare_reports(&earlier, &later);
        let backward = engine.compare_reports(&later, &earlier);
        assert!(forward.is_valid() && backward.is_valid());
        assert_eq!(forward.rows.len(), Metric::ROWS.len());

        for (f, b) in forward.rows.iter().zip(&backward.rows) {
            assert_eq!(f.metric, b.metric);
            assert_eq!(f.delta, -b.delta, "{}", f.label());
            assert_eq!(f.baseline, b.benchmark);
            assert_eq!(f.benchmark, b.baseline);
        }

        let without_chronology = |v: &ComparisonValidation| -> Vec<ComparisonIssue> {
            v.warnings
                .iter()
                .filter(|w| !matches!(w, ComparisonIssue::ReverseChronology { .. }))
                .cloned()
                .collect()
        };
        assert_eq!(forward.validation.warnings.len(), 1);
        assert_eq!(backward.validation.warnings.len(), 2);
        assert!(matches!(
            backward.validation.warnings[1],
            ComparisonIssue::ReverseChronology { .. }
        ));
        assert_eq!(
            without_chronology(&forward.validation).len(),
            without_chronology(&backward.validation).len()
        );
        assert!(matches!(
            without_chronology(&backward.validation)[0],
            ComparisonIssue::EntityMismatch { ref baseline_ticker, .. } if baseline_ticker == "BETA"
        ));
    }
}
