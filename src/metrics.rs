//! Pure helpers shared by the library summaries and the comparison engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deltas smaller than this are reported as flat.
pub const NEUTRALITY_THRESHOLD: f64 = 1e-3;

/// Percent change of `current` over `prior`.
///
/// The denominator is `|prior|`, so a further decline from a negative prior
/// stays negative instead of flipping sign. Returns 0 when `prior` is zero.
pub fn growth(current: f64, prior: f64) -> f64 {
    if prior == 0.0 {
        return 0.0;
    }
    (current - prior) / prior.abs() * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    ExtremelyBearish,
    Bearish,
    Neutral,
    Bullish,
    ExtremelyBullish,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::ExtremelyBearish => "Extremely Bearish",
            SentimentLabel::Bearish => "Bearish",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::Bullish => "Bullish",
            SentimentLabel::ExtremelyBullish => "Extremely Bullish",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn sentiment_label(score: f64) -> SentimentLabel {
    if score >= 80.0 {
        SentimentLabel::ExtremelyBullish
    } else if score >= 60.0 {
        SentimentLabel::Bullish
    } else if score >= 40.0 {
        SentimentLabel::Neutral
    } else if score >= 20.0 {
        SentimentLabel::Bearish
    } else {
        SentimentLabel::ExtremelyBearish
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentBucket {
    Positive,
    Neutral,
    Negative,
}

pub fn sentiment_bucket(score: f64) -> SentimentBucket {
    if score >= 70.0 {
        SentimentBucket::Positive
    } else if score <= 30.0 {
        SentimentBucket::Negative
    } else {
        SentimentBucket::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceDirection {
    Flat,
    Good,
    Bad,
}

/// Classifies a delta. Higher is better unless `invert` is set (cost rows);
/// anything inside the neutrality threshold is flat regardless.
pub fn variance_direction(value: f64, invert: bool) -> VarianceDirection {
    if value.abs() < NEUTRALITY_THRESHOLD {
        return VarianceDirection::Flat;
    }
    let is_positive = value > 0.0;
    if is_positive != invert {
        VarianceDirection::Good
    } else {
        VarianceDirection::Bad
    }
}

const COMPACT_UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];

/// Renders a dollar amount: `$12,345.00`, or `$1.23B` when `compact`.
pub fn format_currency(value: f64, compact: bool, decimals: usize) -> String {
    let abs = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };

    if compact {
        if let Some((divisor, suffix)) = COMPACT_UNITS.iter().find(|(d, _)| *d <= abs) {
            return format!("{}${:.*}{}", sign, decimals, abs / divisor, suffix);
        }
    }

    format!("{}${}", sign, group_thousands(abs, decimals))
}

fn group_thousands(abs: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, abs);
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{}.{}", grouped, frac),
        None => grouped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth() {
        assert_eq!(growth(120.0, 100.0), 20.0);
        assert_eq!(growth(80.0, 100.0), -20.0);
        assert_eq!(growth(100.0, 0.0), 0.0);
        assert_eq!(growth(1000.0, 800.0), 25.0);
        assert_eq!(growth(7.0, 7.0), 0.0);
        assert_eq!(growth(200.0, 100.0), 100.0);
        // a deeper loss stays negative
        assert_eq!(growth(-150.0, -100.0), -50.0);
        // recovering from a loss is positive
        assert_eq!(growth(-50.0, -100.0), 50.0);
    }

    #[test]
    fn test_sentiment_label_thresholds() {
        assert_eq!(sentiment_label(80.0), SentimentLabel::ExtremelyBullish);
        assert_eq!(sentiment_label(65.0), SentimentLabel::Bullish);
        assert_eq!(sentiment_label(60.0), SentimentLabel::Bullish);
        assert_eq!(sentiment_label(45.0), SentimentLabel::Neutral);
        assert_eq!(sentiment_label(25.0), SentimentLabel::Bearish);
        assert_eq!(sentiment_label(10.0), SentimentLabel::ExtremelyBearish);
        assert_eq!(sentiment_label(0.0).to_string(), "Extremely Bearish");
    }

    #[test]
    fn test_sentiment_label_is_monotone() {
        let mut previous = sentiment_label(0.0);
        for score in 0..=100 {
            let label = sentiment_label(score as f64);
            assert!(label >= previous, "label dropped at {}", score);
            previous = label;
        }
    }

    #[test]
    fn test_sentiment_bucket() {
        assert_eq!(sentiment_bucket(70.0), SentimentBucket::Positive);
        assert_eq!(sentiment_bucket(30.0), SentimentBucket::Negative);
        assert_eq!(sentiment_bucket(50.0), SentimentBucket::Neutral);
        assert_eq!(sentiment_bucket(31.0), SentimentBucket::Neutral);
    }

    #[test]
    fn test_variance_direction() {
        assert_eq!(variance_direction(10.0, false), VarianceDirection::Good);
        assert_eq!(variance_direction(-10.0, false), VarianceDirection::Bad);
        assert_eq!(variance_direction(0.0, false), VarianceDirection::Flat);
        assert_eq!(variance_direction(0.0009, true), VarianceDirection::Flat);
        assert_eq!(variance_direction(10.0, true), VarianceDirection::Bad);
        assert_eq!(variance_direction(-10.0, true), VarianceDirection::Good);
    }

    #[test]
    fn test_format_currency_standard() {
        assert_eq!(format_currency(0.0, false, 2), "$0.00");
        assert_eq!(format_currency(12345.0, false, 2), "$12,345.00");
        assert_eq!(format_currency(12345.67, false, 2), "$12,345.67");
        assert_eq!(format_currency(-54321.0, false, 2), "-$54,321.00");
        assert_eq!(format_currency(-54321.98, false, 2), "-$54,321.98");
        assert_eq!(format_currency(100.123, false, 3), "$100.123");
        assert_eq!(format_currency(1_234_567.0, false, 0), "$1,234,567");
    }

    #[test]
    fn test_format_currency_compact() {
        assert_eq!(format_currency(1.23e12, true, 2), "$1.23T");
        assert_eq!(format_currency(2.34e9, true, 2), "$2.34B");
        assert_eq!(format_currency(3.45e6, true, 2), "$3.45M");
        assert_eq!(format_currency(4.56e3, true, 2), "$4.56K");
        assert_eq!(format_currency(567.0, true, 2), "$567.00");
        assert_eq!(format_currency(-1.5e9, true, 2), "-$1.50B");
        assert_eq!(format_currency(1.2345e6, true, 4), "$1.2345M");
        assert_eq!(format_currency(0.0, true, 2), "$0.00");
    }
}
