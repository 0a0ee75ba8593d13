// Prompt text for every model call the analyzer makes.

use crate::metrics::format_currency;
use crate::schema::FinancialReport;

pub const EXTRACTION_PROMPT: &str = "Conduct a rigorous financial analysis of this earnings report. \
Extract all numerical KPIs with 100% accuracy. Use your thinking capacity to ensure year-over-year \
calculations are correct. Determine a 'sentimentScore' (0-100) based on management's verbal \
confidence during the call/release transcript.";

pub const REPAIR_SYSTEM_PROMPT: &str = "You are a JSON Repair Agent.";

pub const NO_MARKET_CONTEXT: &str = "No market context available at this time.";

pub const UNTITLED_SOURCE: &str = "External Source";

pub const GUIDANCE_ASPECT_RATIO: &str = "16:9";

pub fn repair_prompt(error: &str) -> String {
    format!(
        "The JSON you provided failed validation:\n\nERROR: {}\n\n\
        TASK: Return a JSON Patch (RFC 6902) array to fix this. \
        Do NOT return the full JSON. Return ONLY the patch array.\n\
        Example: [{{ \"op\": \"replace\", \"path\": \"/path/to/field\", \"value\": \"fixed_value\" }}]",
        error
    )
}

pub fn market_scan_prompt(ticker: &str, company: &str) -> String {
    format!(
        "Perform a comprehensive market scan for {} ({}) focusing on developments since their \
        last earnings report. Include current stock price trends, major news, and analyst \
        upgrades/downgrades.",
        company, ticker
    )
}

fn signed_percent(value: f64) -> String {
    if value >= 0.0 {
        format!("up {:.1} percent", value)
    } else {
        format!("down {:.1} percent", value.abs())
    }
}

/// Spoken briefing script. Built only from the report so the same report always
/// yields the same script.
pub fn briefing_script(report: &FinancialReport) -> String {
    let mut script = format!(
        "{} earnings briefing for {} {}. Revenue came in at {}, {} year over year. \
        Net income was {}",
        report.company_name,
        report.report_period,
        report.report_year,
        format_currency(report.revenue, true, 2),
        signed_percent(report.revenue_growth()),
        format_currency(report.net_income, true, 2),
    );
    match report.net_income_growth() {
        Some(growth) => script.push_str(&format!(", {}. ", signed_percent(growth))),
        None => script.push_str(". "),
    }
    script.push_str(&format!(
        "Diluted earnings per share were {:.2} dollars, with a gross margin of {:.1} percent. ",
        report.eps, report.gross_margin
    ));
    if let Some(first) = report.highlights.first() {
        script.push_str(&format!("The key takeaway: {}. ", first.trim_end_matches('.')));
    }
    script.push_str(&format!(
        "Management tone reads as {}, with a sentiment score of {} out of 100.",
        report.sentiment_label().as_str().to_lowercase(),
        report.sentiment_score
    ));
    script
}

/// One line summary stored next to the synthesized audio.
pub fn briefing_summary(report: &FinancialReport) -> String {
    format!(
        "{} {} {}: revenue {} ({:+.1}% YoY), sentiment {}",
        report.ticker,
        report.report_period,
        report.report_year,
        format_currency(report.revenue, true, 2),
        report.revenue_growth(),
        report.sentiment_label()
    )
}

pub fn guidance_image_prompt(report: &FinancialReport) -> String {
    let mut prompt = format!(
        "A clean, professional infographic visualizing the forward guidance of {} ({}) after its \
        {} {} results. Dark background, minimal text, upward or downward arrows reflecting the \
        outlook. ",
        report.company_name, report.ticker, report.report_period, report.report_year
    );
    if !report.highlights.is_empty() {
        prompt.push_str("Key themes: ");
        prompt.push_str(
            &report
                .highlights
                .iter()
                .take(3)
                .map(|h| h.trim_end_matches('.'))
                .collect::<Vec<_>>()
                .join("; "),
        );
        prompt.push_str(". ");
    }
    if !report.management_commentary.is_empty() {
        prompt.push_str("Management outlook: ");
        prompt.push_str(report.management_commentary.trim());
    }
    prompt.trim_end().to_string()
}

/// System instruction for a live voice session about one report.
pub fn live_analyst_instruction(report: &FinancialReport) -> String {
    let mut instruction = format!(
        "You are a senior equity research analyst discussing the {} {} earnings of {} ({}) \
        with a portfolio manager. Answer concisely and ground every number in the report data \
        below. If something is not in the data, say so.\n\n",
        report.report_period, report.report_year, report.company_name, report.ticker
    );
    instruction.push_str(&format!(
        "Revenue: {} (prior year {})\n",
        format_currency(report.revenue, false, 2),
        format_currency(report.revenue_prior, false, 2)
    ));
    instruction.push_str(&format!(
        "Net income: {}\n",
        format_currency(report.net_income, false, 2)
    ));
    instruction.push_str(&format!("Diluted EPS: {:.2}\n", report.eps));
    instruction.push_str(&format!(
        "Margins: gross {:.1}%, operating {:.1}%, net {:.1}%\n",
        report.gross_margin, report.operating_margin, report.net_margin
    ));
    instruction.push_str(&format!(
        "Sentiment: {} ({}/100)\n",
        report.sentiment_label(),
        report.sentiment_score
    ));
    for highlight in &report.highlights {
        instruction.push_str("- ");
        instruction.push_str(highlight);
        instruction.push('\n');
    }
    if !report.management_commentary.is_empty() {
        instruction.push_str("Management commentary: ");
        instruction.push_str(&report.management_commentary);
        instruction.push('\n');
    }
    instruction
}
