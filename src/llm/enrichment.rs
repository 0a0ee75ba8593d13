//! Optional report enrichments. Each one is independent of extraction and of
//! the others; a failure here never touches the stored report.

use log::info;

use crate::error::Result;
use crate::llm::capabilities::{GroundedSearch, ImageGeneration, SpeechSynthesis};
use crate::llm::prompts::{
    briefing_script, briefing_summary, guidance_image_prompt, market_scan_prompt,
    GUIDANCE_ASPECT_RATIO, NO_MARKET_CONTEXT, UNTITLED_SOURCE,
};
use crate::llm::types::GroundedAnswer;
use crate::schema::{AudioBriefing, FinancialReport, MarketContext, MarketInsight, VisualizedGuidance};
use crate::utils::now_millis;

pub async fn market_context<S>(search: &S, ticker: &str, company: &str) -> Result<MarketContext>
where
    S: GroundedSearch + ?Sized,
{
    let answer = search.search(&market_scan_prompt(ticker, company)).await?;
    let context = market_context_from(answer, now_millis());
    info!(
        "Market context for {}: {} source(s)",
        ticker,
        context.insights.len()
    );
    Ok(context)
}

/// Shapes a grounded answer. Sources without a uri are dropped.
pub fn market_context_from(answer: GroundedAnswer, timestamp: i64) -> MarketContext {
    let insights = answer
        .sources
        .into_iter()
        .filter_map(|source| {
            let uri = source.uri.filter(|u| !u.trim().is_empty())?;
            Some(MarketInsight {
                title: source
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| UNTITLED_SOURCE.to_string()),
                uri,
                snippet: String::new(),
            })
        })
        .collect();

    MarketContext {
        summary: answer
            .text
            .unwrap_or_else(|| NO_MARKET_CONTEXT.to_string()),
        insights,
        timestamp,
    }
}

pub async fn audio_briefing<T>(tts: &T, report: &FinancialReport, voice: &str) -> Result<AudioBriefing>
where
    T: SpeechSynthesis + ?Sized,
{
    let audio_base64 = tts.synthesize(&briefing_script(report), voice).await?;
    Ok(AudioBriefing {
        audio_base64,
        summary: briefing_summary(report),
        voice: voice.to_string(),
    })
}

pub async fn visualize_guidance<I>(images: &I, report: &FinancialReport) -> Result<VisualizedGuidance>
where
    I: ImageGeneration + ?Sized,
{
    let prompt = guidance_image_prompt(report);
    let image = images.generate_image(&prompt, GUIDANCE_ASPECT_RATIO).await?;
    Ok(VisualizedGuidance {
        mime_type: image.mime_type,
        data_base64: image.data_base64,
        prompt,
        aspect_ratio: GUIDANCE_ASPECT_RATIO.to_string(),
    })
}
