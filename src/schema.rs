use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::SchemaError;
use crate::metrics::{growth, sentiment_bucket, sentiment_label, SentimentBucket, SentimentLabel};

/// Kind of disclosure. The set is open: labels outside the three known kinds
/// are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReportType {
    TenQ,
    TenK,
    PressRelease,
    Other(String),
}

pub const OTHER_REPORT_TYPE: &str = "Other";

impl Default for ReportType {
    fn default() -> Self {
        ReportType::Other(OTHER_REPORT_TYPE.to_string())
    }
}

impl ReportType {
    pub fn as_str(&self) -> &str {
        match self {
            ReportType::TenQ => "10-Q",
            ReportType::TenK => "10-K",
            ReportType::PressRelease => "Press Release",
            ReportType::Other(label) => label,
        }
    }

    /// Lenient match on the known kinds; any other label is kept as written.
    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        let normalized: String = trimmed
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "10q" => ReportType::TenQ,
            "10k" => ReportType::TenK,
            "pressrelease" => ReportType::PressRelease,
            _ if trimmed.is_empty() => ReportType::default(),
            _ => ReportType::Other(trimmed.to_string()),
        }
    }
}

impl Serialize for ReportType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReportType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(ReportType::from_label(&label))
    }
}

impl JsonSchema for ReportType {
    fn schema_name() -> String {
        "ReportType".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            enum_values: Some(
                ["10-Q", "10-K", "Press Release", OTHER_REPORT_TYPE]
                    .iter()
                    .map(|label| Value::String(label.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
        .into()
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseCategory {
    #[schemars(description = "Expense line as labelled in the filing (e.g. 'Research & Development')")]
    pub category: String,

    #[schemars(description = "Amount for the reported period, in the filing's reporting currency units")]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuarterlyTrend {
    #[schemars(description = "Period label such as 'Q1 23'. Oldest period first.")]
    pub period: String,

    pub revenue: f64,

    pub net_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInsight {
    pub title: String,
    pub uri: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub summary: String,
    #[serde(default)]
    pub insights: Vec<MarketInsight>,
    /// Milliseconds since epoch when the context was fetched.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioBriefing {
    /// Base64 encoded 24 kHz mono PCM16.
    pub audio_base64: String,
    pub summary: String,
    #[serde(default)]
    pub voice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizedGuidance {
    pub mime_type: String,
    pub data_base64: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: String,
}

/// A validated earnings record as held by the library.
///
/// Identity (`id`, `timestamp`) is minted by the extraction client. Provenance and
/// primary metrics never change after creation; only the enrichment fields are
/// attached later. Fields this version does not know about are kept in `extra`
/// so that a persisted library survives a round-trip through older code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialReport {
    pub id: String,
    /// Milliseconds since epoch.
    pub timestamp: i64,

    pub company_name: String,
    pub ticker: String,
    #[serde(default)]
    pub report_type: ReportType,
    pub report_period: String,
    pub report_year: i32,

    pub revenue: f64,
    pub revenue_prior: f64,
    pub net_income: f64,
    #[serde(default)]
    pub net_income_prior: Option<f64>,
    pub eps: f64,
    #[serde(default)]
    pub eps_prior: Option<f64>,

    pub gross_margin: f64,
    #[serde(default)]
    pub operating_margin: f64,
    #[serde(default)]
    pub net_margin: f64,

    pub sentiment_score: u8,

    #[serde(default)]
    pub expenses: Vec<ExpenseCategory>,
    #[serde(default)]
    pub trends: Vec<QuarterlyTrend>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub management_commentary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_context: Option<MarketContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_briefing: Option<AudioBriefing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualized_guidance: Option<VisualizedGuidance>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FinancialReport {
    pub fn has_identity(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn revenue_growth(&self) -> f64 {
        growth(self.revenue, self.revenue_prior)
    }

    pub fn net_income_growth(&self) -> Option<f64> {
        self.net_income_prior.map(|prior| growth(self.net_income, prior))
    }

    pub fn eps_growth(&self) -> Option<f64> {
        self.eps_prior.map(|prior| growth(self.eps, prior))
    }

    pub fn sentiment_label(&self) -> SentimentLabel {
        sentiment_label(self.sentiment_score as f64)
    }

    pub fn sentiment_bucket(&self) -> SentimentBucket {
        sentiment_bucket(self.sentiment_score as f64)
    }

    /// "ACME - Q3 2023", as shown in selection lists.
    pub fn display_label(&self) -> String {
        format!("{} - {} {}", self.ticker, self.report_period, self.report_year)
    }

    pub fn total_expenses(&self) -> f64 {
        self.expenses.iter().map(|e| e.amount).sum()
    }

    /// Checks what a stored report must satisfy: every amount finite and the
    /// sentiment score within 0..=100.
    pub fn check_storable(&self) -> Result<(), SchemaError> {
        let scalars = [
            ("revenue", Some(self.revenue)),
            ("revenuePrior", Some(self.revenue_prior)),
            ("netIncome", Some(self.net_income)),
            ("netIncomePrior", self.net_income_prior),
            ("eps", Some(self.eps)),
            ("epsPrior", self.eps_prior),
            ("grossMargin", Some(self.gross_margin)),
            ("operatingMargin", Some(self.operating_margin)),
            ("netMargin", Some(self.net_margin)),
        ];
        for (field, value) in scalars {
            if let Some(value) = value {
                finite(field, value)?;
            }
        }
        for (i, expense) in self.expenses.iter().enumerate() {
            finite(&format!("expenses[{}].amount", i), expense.amount)?;
        }
        for (i, trend) in self.trends.iter().enumerate() {
            finite(&format!("trends[{}].revenue", i), trend.revenue)?;
            finite(&format!("trends[{}].netIncome", i), trend.net_income)?;
        }
        if self.sentiment_score > 100 {
            return Err(SchemaError::InvalidValue {
                field: "sentimentScore".to_string(),
                reason: format!("{} is outside 0..=100", self.sentiment_score),
            });
        }
        Ok(())
    }
}

fn finite(field: &str, value: f64) -> Result<(), SchemaError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SchemaError::InvalidValue {
            field: field.to_string(),
            reason: format!("{} is not a finite number", value),
        })
    }
}

/// The shape requested from the document model. Identity and enrichments are
/// never asked of the model; they are attached afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedReport {
    #[schemars(description = "Legal name of the reporting company")]
    pub company_name: String,

    #[schemars(description = "Exchange ticker symbol, uppercase (e.g. 'AAPL')")]
    pub ticker: String,

    #[schemars(description = "Kind of disclosure: '10-Q', '10-K', 'Press Release' or 'Other'")]
    pub report_type: ReportType,

    #[schemars(description = "Fiscal period label, e.g. 'Q3' or 'FY'")]
    pub report_period: String,

    #[schemars(description = "Fiscal year of the reported period, e.g. 2024")]
    pub report_year: i32,

    #[schemars(description = "Total revenue for the period (GAAP)")]
    pub revenue: f64,

    #[schemars(description = "Total revenue for the same period one year earlier")]
    pub revenue_prior: f64,

    #[schemars(description = "GAAP net income for the period; negative for a loss")]
    pub net_income: f64,

    #[schemars(description = "GAAP net income for the same period one year earlier")]
    pub net_income_prior: Option<f64>,

    #[schemars(description = "Diluted earnings per share for the period")]
    pub eps: f64,

    #[schemars(description = "Diluted earnings per share for the same period one year earlier")]
    pub eps_prior: Option<f64>,

    #[schemars(description = "Gross margin as a percentage (0-100 scale)")]
    pub gross_margin: f64,

    #[schemars(description = "Operating margin as a percentage (0-100 scale, may be negative)")]
    pub operating_margin: Option<f64>,

    #[schemars(description = "Net margin as a percentage (0-100 scale, may be negative)")]
    pub net_margin: Option<f64>,

    #[schemars(
        description = "A score from 0 (very bearish) to 100 (very bullish) based on management tone."
    )]
    pub sentiment_score: i64,

    #[schemars(description = "Operating expense breakdown; one entry per category")]
    pub expenses: Vec<ExpenseCategory>,

    #[schemars(description = "Recent quarterly revenue and net income, oldest first")]
    pub trends: Vec<QuarterlyTrend>,

    #[schemars(description = "Key takeaways from the filing, most important first")]
    pub highlights: Vec<String>,

    #[schemars(description = "Short synthesis of management's commentary and outlook")]
    pub management_commentary: Option<String>,
}

impl ExtractedReport {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ExtractedReport)
    }

    /// Response schema in the dialect the document model accepts.
    pub fn response_schema() -> serde_json::Result<Value> {
        clean_schema(Self::generate_json_schema())
    }
}

const ALLOWED_SCHEMA_KEYS: &[&str] = &[
    "type",
    "description",
    "properties",
    "required",
    "items",
    "enum",
    "nullable",
];

/// Flattens a schemars schema: inlines `$ref`s, drops `$schema`/`definitions`,
/// rewrites `["T", "null"]` type unions to `nullable`, and strips keywords the
/// model API rejects.
pub fn clean_schema(root: schemars::schema::RootSchema) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(&root)?;
    let definitions = value
        .get("definitions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("definitions");
        obj.remove("title");
    }

    Ok(clean_node(value, &definitions))
}

fn clean_node(node: Value, definitions: &Map<String, Value>) -> Value {
    match node {
        Value::Object(mut obj) => {
            if let Some(reference) = obj.get("$ref").and_then(Value::as_str).map(str::to_string) {
                let name = reference.trim_start_matches("#/definitions/");
                if let Some(target) = definitions.get(name) {
                    let mut resolved = clean_node(target.clone(), definitions);
                    if let (Some(desc), Some(resolved_obj)) =
                        (obj.remove("description"), resolved.as_object_mut())
                    {
                        resolved_obj.insert("description".to_string(), desc);
                    }
                    return resolved;
                }
            }

            // schemars wraps described refs as {"allOf": [{"$ref": ..}], "description": ..}
            if let Some(Value::Array(all_of)) = obj.remove("allOf") {
                if let Some(first) = all_of.into_iter().next() {
                    let mut resolved = clean_node(first, definitions);
                    if let (Some(desc), Some(resolved_obj)) =
                        (obj.remove("description"), resolved.as_object_mut())
                    {
                        resolved_obj.insert("description".to_string(), desc);
                    }
                    return resolved;
                }
            }

            // enums with per-variant descriptions come out as oneOf of single-value enums
            if let Some(Value::Array(one_of)) = obj.remove("oneOf") {
                let variants: Vec<Value> = one_of
                    .iter()
                    .filter_map(|v| v.get("enum").and_then(Value::as_array))
                    .flatten()
                    .cloned()
                    .collect();
                obj.insert("type".to_string(), Value::String("string".to_string()));
                obj.insert("enum".to_string(), Value::Array(variants));
            }

            if let Some(Value::Array(types)) = obj.get("type").cloned() {
                let non_null: Vec<&Value> =
                    types.iter().filter(|t| t.as_str() != Some("null")).collect();
                if let Some(first) = non_null.first() {
                    obj.insert("type".to_string(), (*first).clone());
                }
                if non_null.len() < types.len() {
                    obj.insert("nullable".to_string(), Value::Bool(true));
                }
            }

            let mut cleaned = Map::new();
            for (key, val) in obj {
                if !ALLOWED_SCHEMA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let val = match key.as_str() {
                    "properties" => match val {
                        Value::Object(props) => Value::Object(
                            props
                                .into_iter()
                                .map(|(k, v)| (k, clean_node(v, definitions)))
                                .collect(),
                        ),
                        other => other,
                    },
                    "items" => clean_node(val, definitions),
                    _ => val,
                };
                cleaned.insert(key, val);
            }
            Value::Object(cleaned)
        }
        other => other,
    }
}
