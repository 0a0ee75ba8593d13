//! The single translation boundary from untyped extractor output to a
//! [`FinancialReport`]. Validation is pure: the same input and reference year
//! always give the same report or the same rejection.

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::SchemaError;
use crate::schema::{ExpenseCategory, FinancialReport, QuarterlyTrend, ReportType};
use crate::utils::{current_year, is_valid_period_label};

pub const MIN_REPORT_YEAR: i32 = 1900;

const KNOWN_FIELDS: &[&str] = &[
    "id",
    "timestamp",
    "companyName",
    "ticker",
    "reportType",
    "reportPeriod",
    "reportYear",
    "revenue",
    "revenuePrior",
    "netIncome",
    "netIncomePrior",
    "eps",
    "epsPrior",
    "grossMargin",
    "operatingMargin",
    "netMargin",
    "sentimentScore",
    "expenses",
    "trends",
    "highlights",
    "managementCommentary",
    "marketContext",
    "audioBriefing",
    "visualizedGuidance",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    SentimentClamped { original: f64, clamped: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub report: FinancialReport,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Clone)]
pub struct ReportValidator {
    max_year: i32,
}

impl Default for ReportValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportValidator {
    pub fn new() -> Self {
        Self::with_current_year(current_year())
    }

    /// Pins the reference year; reports may be dated up to one year ahead of it.
    pub fn with_current_year(year: i32) -> Self {
        Self { max_year: year + 1 }
    }

    pub fn validate(&self, raw: &Value) -> Result<FinancialReport, SchemaError> {
        let validated = self.validate_with_warnings(raw)?;
        for warning in &validated.warnings {
            match warning {
                ValidationWarning::SentimentClamped { original, clamped } => warn!(
                    "sentimentScore {} out of range for {}, clamped to {}",
                    original, validated.report.ticker, clamped
                ),
            }
        }
        Ok(validated.report)
    }

    pub fn validate_with_warnings(&self, raw: &Value) -> Result<Validated, SchemaError> {
        let obj = raw.as_object().ok_or_else(|| SchemaError::TypeMismatch {
            field: "$root".to_string(),
            expected: "object".to_string(),
            got: json_type(raw).to_string(),
        })?;

        let mut warnings = Vec::new();

        let company_name = required_string(obj, "companyName")?;

        let ticker = required_string(obj, "ticker")?.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(invalid("ticker", "must not be empty"));
        }

        let report_type = ReportType::from_label(&required_string(obj, "reportType")?);

        let report_period = required_string(obj, "reportPeriod")?.trim().to_string();
        if !is_valid_period_label(&report_period) {
            return Err(invalid(
                "reportPeriod",
                &format!("'{}' is not a period label like 'Q3' or 'FY'", report_period),
            ));
        }

        let report_year = required_integer(obj, "reportYear")?;
        if report_year < MIN_REPORT_YEAR as i64 || report_year > self.max_year as i64 {
            return Err(invalid(
                "reportYear",
                &format!(
                    "{} is outside {}..={}",
                    report_year, MIN_REPORT_YEAR, self.max_year
                ),
            ));
        }

        let raw_sentiment = required_number(obj, "sentimentScore")?;
        let clamped = raw_sentiment.round().clamp(0.0, 100.0);
        if !(0.0..=100.0).contains(&raw_sentiment) {
            warnings.push(ValidationWarning::SentimentClamped {
                original: raw_sentiment,
                clamped: clamped as u8,
            });
        }

        let report = FinancialReport {
            id: optional_string(obj, "id")?.unwrap_or_default(),
            timestamp: optional_integer(obj, "timestamp")?.unwrap_or(0),
            company_name: company_name.trim().to_string(),
            ticker,
            report_type,
            report_period,
            report_year: report_year as i32,
            revenue: required_number(obj, "revenue")?,
            revenue_prior: required_number(obj, "revenuePrior")?,
            net_income: required_number(obj, "netIncome")?,
            net_income_prior: optional_number(obj, "netIncomePrior")?,
            eps: required_number(obj, "eps")?,
            eps_prior: optional_number(obj, "epsPrior")?,
            gross_margin: required_number(obj, "grossMargin")?,
            operating_margin: optional_number(obj, "operatingMargin")?.unwrap_or(0.0),
            net_margin: optional_number(obj, "netMargin")?.unwrap_or(0.0),
            sentiment_score: clamped as u8,
            expenses: expenses(obj)?,
            trends: trends(obj)?,
            highlights: highlights(obj)?,
            management_commentary: optional_string(obj, "managementCommentary")?
                .unwrap_or_default(),
            market_context: optional_record(obj, "marketContext")?,
            audio_briefing: optional_record(obj, "audioBriefing")?,
            visualized_guidance: optional_record(obj, "visualizedGuidance")?,
            extra: obj
                .iter()
                .filter(|(k, _)| !KNOWN_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        Ok(Validated { report, warnings })
    }
}

/// Validates against the current calendar year.
pub fn validate(raw: &Value) -> Result<FinancialReport, SchemaError> {
    ReportValidator::new().validate(raw)
}

fn expenses(obj: &Map<String, Value>) -> Result<Vec<ExpenseCategory>, SchemaError> {
    let items = required_array(obj, "expenses")?;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        let path = format!("expenses[{}]", idx);
        let entry = as_object(item, &path)?;
        let category = required_string(entry, "category")
            .map_err(|e| nest(e, &path))?
            .trim()
            .to_string();
        let amount = required_number(entry, "amount").map_err(|e| nest(e, &path))?;

        if !seen.insert(category.to_lowercase()) {
            return Err(invalid(
                "expenses",
                &format!("duplicate category '{}'", category),
            ));
        }
        out.push(ExpenseCategory { category, amount });
    }
    Ok(out)
}

fn trends(obj: &Map<String, Value>) -> Result<Vec<QuarterlyTrend>, SchemaError> {
    let items = required_array(obj, "trends")?;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        let path = format!("trends[{}]", idx);
        let entry = as_object(item, &path)?;
        let period = required_string(entry, "period")
            .map_err(|e| nest(e, &path))?
            .trim()
            .to_string();
        let revenue = required_number(entry, "revenue").map_err(|e| nest(e, &path))?;
        let net_income = required_number(entry, "netIncome").map_err(|e| nest(e, &path))?;

        if !seen.insert(period.clone()) {
            return Err(invalid("trends", &format!("duplicate period '{}'", period)));
        }
        out.push(QuarterlyTrend {
            period,
            revenue,
            net_income,
        });
    }
    Ok(out)
}

fn highlights(obj: &Map<String, Value>) -> Result<Vec<String>, SchemaError> {
    required_array(obj, "highlights")?
        .iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(mismatch(&format!("highlights[{}]", idx), "string", other)),
        })
        .collect()
}

fn present<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn required<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value, SchemaError> {
    present(obj, field).ok_or_else(|| SchemaError::Incomplete {
        field: field.to_string(),
    })
}

fn required_string(obj: &Map<String, Value>, field: &str) -> Result<String, SchemaError> {
    match required(obj, field)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(mismatch(field, "string", other)),
    }
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, SchemaError> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(mismatch(field, "string", other)),
    }
}

fn required_number(obj: &Map<String, Value>, field: &str) -> Result<f64, SchemaError> {
    coerce_number(field, required(obj, field)?)
}

fn optional_number(obj: &Map<String, Value>, field: &str) -> Result<Option<f64>, SchemaError> {
    present(obj, field)
        .map(|v| coerce_number(field, v))
        .transpose()
}

fn required_integer(obj: &Map<String, Value>, field: &str) -> Result<i64, SchemaError> {
    coerce_integer(field, required(obj, field)?)
}

fn optional_integer(obj: &Map<String, Value>, field: &str) -> Result<Option<i64>, SchemaError> {
    present(obj, field)
        .map(|v| coerce_integer(field, v))
        .transpose()
}

fn required_array<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a Vec<Value>, SchemaError> {
    match required(obj, field)? {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(field, "array", other)),
    }
}

fn optional_record<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    field: &str,
) -> Result<Option<T>, SchemaError> {
    match present(obj, field) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| invalid(field, &e.to_string())),
    }
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaError> {
    value
        .as_object()
        .ok_or_else(|| mismatch(path, "object", value))
}

/// Numbers pass through; strings made only of digits and separators
/// ("1,234.5", "-42") are coerced. Anything else is a type mismatch.
fn coerce_number(field: &str, value: &Value) -> Result<f64, SchemaError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_string(s),
        _ => None,
    };

    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        Some(_) => Err(invalid(field, "must be finite")),
        None => Err(mismatch(field, "number", value)),
    }
}

fn coerce_integer(field: &str, value: &Value) -> Result<i64, SchemaError> {
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    let n = coerce_number(field, value).map_err(|_| mismatch(field, "integer", value))?;
    if n.fract() != 0.0 || n.abs() > i64::MAX as f64 {
        return Err(mismatch(field, "integer", value));
    }
    Ok(n as i64)
}

fn parse_numeric_string(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if body.is_empty()
        || !body.chars().any(|c| c.is_ascii_digit())
        || !body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | ' ' | '_'))
    {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '_'))
        .collect();
    cleaned.parse().ok()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(field: &str, expected: &str, got: &Value) -> SchemaError {
    SchemaError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        got: json_type(got).to_string(),
    }
}

fn invalid(field: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn nest(err: SchemaError, path: &str) -> SchemaError {
    match err {
        SchemaError::Incomplete { field } => SchemaError::Incomplete {
            field: format!("{}.{}", path, field),
        },
        SchemaError::TypeMismatch {
            field,
            expected,
            got,
        } => SchemaError::TypeMismatch {
            field: format!("{}.{}", path, field),
            expected,
            got,
        },
        SchemaError::InvalidValue { field, reason } => SchemaError::InvalidValue {
            field: format!("{}.{}", path, field),
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_report() -> Value {
        json!({
            "companyName": "Acme Corp",
            "ticker": " acme ",
            "reportType": "10-Q",
            "reportPeriod": "Q3",
            "reportYear": 2023,
            "revenue": 1000.0,
            "revenuePrior": 800.0,
            "netIncome": 120.0,
            "netIncomePrior": 100.0,
            "eps": 1.2,
            "epsPrior": 1.0,
            "grossMargin": 42.5,
            "operatingMargin": 18.0,
            "netMargin": 12.0,
            "sentimentScore": 72,
            "expenses": [{ "category": "R&D", "amount": 150.0 }],
            "trends": [
                { "period": "Q2 23", "revenue": 950.0, "netIncome": 110.0 },
                { "period": "Q3 23", "revenue": 1000.0, "netIncome": 120.0 }
            ],
            "highlights": ["Record quarter"],
            "managementCommentary": "We remain confident."
        })
    }

    fn validator() -> ReportValidator {
        ReportValidator::with_current_year(2024)
    }

    #[test]
    fn test_valid_report_normalizes_ticker() {
        let report = validator().validate(&raw_report()).unwrap();
        assert_eq!(report.ticker, "ACME");
        assert_eq!(report.report_type, ReportType::TenQ);
        assert_eq!(report.sentiment_score, 72);
        assert_eq!(report.trends.len(), 2);
        assert!(!report.has_identity());
    }

    #[test]
    fn test_missing_required_field() {
        for field in ["companyName", "revenuePrior", "expenses", "sentimentScore"] {
            let mut raw = raw_report();
            raw.as_object_mut().unwrap().remove(field);
            let err = validator().validate(&raw).unwrap_err();
            assert_eq!(
                err,
                SchemaError::Incomplete {
                    field: field.to_string()
                }
            );
        }
    }

    #[test]
    fn test_null_required_field_is_incomplete() {
        let mut raw = raw_report();
        raw["eps"] = Value::Null;
        assert!(matches!(
            validator().validate(&raw),
            Err(SchemaError::Incomplete { field }) if field == "eps"
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let mut raw = raw_report();
        raw["revenue"] = json!("about a thousand");
        let err = validator().validate(&raw).unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeMismatch {
                field: "revenue".to_string(),
                expected: "number".to_string(),
                got: "string".to_string(),
            }
        );

        let mut raw = raw_report();
        raw["highlights"] = json!("not a list");
        assert!(matches!(
            validator().validate(&raw),
            Err(SchemaError::TypeMismatch { field, .. }) if field == "highlights"
        ));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let mut raw = raw_report();
        raw["revenue"] = json!("1,000.50");
        raw["netIncome"] = json!("-42");
        raw["reportYear"] = json!("2023");
        let report = validator().validate(&raw).unwrap();
        assert_eq!(report.revenue, 1000.5);
        assert_eq!(report.net_income, -42.0);
        assert_eq!(report.report_year, 2023);
    }

    #[test]
    fn test_report_year_bounds() {
        let mut raw = raw_report();
        raw["reportYear"] = json!(2025);
        assert!(validator().validate(&raw).is_ok());

        raw["reportYear"] = json!(2026);
        assert!(matches!(
            validator().validate(&raw),
            Err(SchemaError::InvalidValue { field, .. }) if field == "reportYear"
        ));

        raw["reportYear"] = json!(1899);
        assert!(validator().validate(&raw).is_err());

        raw["reportYear"] = json!(2023.5);
        assert!(matches!(
            validator().validate(&raw),
            Err(SchemaError::TypeMismatch { field, .. }) if field == "reportYear"
        ));
    }

    #[test]
    fn test_report_period_shape() {
        let mut raw = raw_report();
        raw["reportPeriod"] = json!("1H");
        assert!(matches!(
            validator().validate(&raw),
            Err(SchemaError::InvalidValue { field, .. }) if field == "reportPeriod"
        ));

        raw["reportPeriod"] = json!("FY");
        assert_eq!(validator().validate(&raw).unwrap().report_period, "FY");
    }

    #[test]
    fn test_sentiment_is_clamped_with_warning() {
        let mut raw = raw_report();
        raw["sentimentScore"] = json!(140);
        let validated = validator().validate_with_warnings(&raw).unwrap();
        assert_eq!(validated.report.sentiment_score, 100);
        assert_eq!(
            validated.warnings,
            vec![ValidationWarning::SentimentClamped {
                original: 140.0,
                clamped: 100
            }]
        );

        raw["sentimentScore"] = json!(-5);
        assert_eq!(validator().validate(&raw).unwrap().sentiment_score, 0);
    }

    #[test]
    fn test_duplicate_expense_category_rejected() {
        let mut raw = raw_report();
        raw["expenses"] = json!([
            { "category": "R&D", "amount": 1.0 },
            { "category": "r&d", "amount": 2.0 }
        ]);
        assert!(matches!(
            validator().validate(&raw),
            Err(SchemaError::InvalidValue { field, .. }) if field == "expenses"
        ));
    }

    #[test]
    fn test_duplicate_trend_period_rejected() {
        let mut raw = raw_report();
        raw["trends"] = json!([
            { "period": "Q1", "revenue": 1.0, "netIncome": 0.1 },
            { "period": "Q1", "revenue": 2.0, "netIncome": 0.2 }
        ]);
        assert!(validator().validate(&raw).is_err());
    }

    #[test]
    fn test_nested_field_paths() {
        let mut raw = raw_report();
        raw["trends"] = json!([{ "period": "Q1", "revenue": 1.0 }]);
        assert_eq!(
            validator().validate(&raw).unwrap_err().field(),
            "trends[0].netIncome"
        );
    }

    #[test]
    fn test_optional_fields_default() {
        let mut raw = raw_report();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("epsPrior");
        obj.remove("operatingMargin");
        obj.remove("managementCommentary");
        let report = validator().validate(&raw).unwrap();
        assert_eq!(report.eps_prior, None);
        assert_eq!(report.operating_margin, 0.0);
        assert_eq!(report.management_commentary, "");
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let mut raw = raw_report();
        raw["segmentRevenue"] = json!({ "cloud": 400 });
        let report = validator().validate(&raw).unwrap();
        assert_eq!(report.extra["segmentRevenue"], json!({ "cloud": 400 }));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut raw = raw_report();
        raw["id"] = json!("r1");
        raw["timestamp"] = json!(1_700_000_000_000_i64);
        raw["reportType"] = json!("Investor Deck");
        raw["extraNote"] = json!(true);

        let once = validator().validate(&raw).unwrap();
        let reserialized = serde_json::to_value(&once).unwrap();
        let twice = validator().validate(&reserialized).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.id, "r1");
        assert_eq!(twice.report_type, ReportType::Other("Investor Deck".to_string()));
        assert_eq!(reserialized["reportType"], "Investor Deck");
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(matches!(
            validator().validate(&json!([1, 2])),
            Err(SchemaError::TypeMismatch { field, .. }) if field == "$root"
        ));
    }
}
