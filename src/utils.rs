use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static PERIOD_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+\d*$").expect("period label pattern is valid"));

static QUARTER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Qq](\d+)$").expect("quarter label pattern is valid"));

const PDF_MAGIC: &[u8] = b"%PDF-";

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

/// True for labels such as "Q3", "FY" or "H1".
pub fn is_valid_period_label(label: &str) -> bool {
    PERIOD_LABEL.is_match(label)
}

/// The quarter number of a period label ("Q3" -> 3).
///
/// Only quarter labels carry an ordinal; "FY", "H1" and anything else map to 0,
/// so an annual report sorts before the first quarter of the same year.
pub fn period_ordinal(label: &str) -> u32 {
    QUARTER_LABEL
        .captures(label.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Checks the `%PDF-` header, allowing leading whitespace some producers emit.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(PDF_MAGIC)
}
