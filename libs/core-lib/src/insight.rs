//! Insight generation over a text model.
//!
//! The pipeline only sees [`AnalysisResult`]. How the model is asked and how
//! its text is decoded stays in this module, so a change of wire format
//! touches nothing downstream.

use crate::{
    InsightGenerator, UpstreamError,
    domain::{
        analysis::{AnalysisError, AnalysisResult},
        metrics::MetricsSnapshot,
        tenant::SubscriptionTier,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_INSTRUCTION: &str = "You are a senior data analyst for a digital agency. \
Your client is busy: do not define metrics and do not be generic. \
Look at top_content and mention specific URLs that perform well. \
Look at sources and explain where growth is coming from. \
Respond with a single JSON object and nothing else, using exactly these keys: \
\"summary\" (a dense two-sentence narrative), \
\"key_findings\" (an array of exactly 3 specific findings), \
\"top_performing_page\" (the page path that performed best), \
\"strategic_recommendation\" (one actionable recommendation).";

/// One request to a text model.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub system_instruction: String,
    pub prompt: String,
}

/// A generative text model. Returns the raw text of the first answer.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, request: &PromptRequest) -> Result<String, UpstreamError>;
}

pub fn build_prompt(
    snapshot: &MetricsSnapshot,
    tier: SubscriptionTier,
    window_days: u32,
) -> Result<PromptRequest, AnalysisError> {
    let metrics = serde_json::to_string_pretty(snapshot)
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    let depth = if tier.is_paid() {
        "Provide detailed strategic advice with concrete next steps."
    } else {
        "Keep the advice short and practical."
    };
    let prompt = format!(
        "Analyze this Google Analytics 4 data for the last {window_days} days.\n\
         Plan level: {tier}. {depth}\n\n\
         Metrics data:\n{metrics}\n"
    );
    Ok(PromptRequest {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        prompt,
    })
}

/// Decodes model text into a validated analysis.
///
/// Tolerates Markdown code fences and prose around the object; rejects
/// anything that does not parse or does not have the expected shape.
pub fn decode_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => return Err(AnalysisError::Malformed("no JSON object in response".into())),
    };
    let analysis: AnalysisResult =
        serde_json::from_str(json).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    analysis.validate()?;
    Ok(analysis)
}

fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (```json), which may share a line with the body
        body = match rest.split_once('\n') {
            Some((info, after)) if !info.contains('{') => after,
            _ => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

pub struct ModelInsightGenerator {
    model: Arc<dyn TextModel>,
}

impl ModelInsightGenerator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl InsightGenerator for ModelInsightGenerator {
    async fn analyze(
        &self,
        snapshot: &MetricsSnapshot,
        tier: SubscriptionTier,
        window_days: u32,
    ) -> Result<AnalysisResult, AnalysisError> {
        let request = build_prompt(snapshot, tier, window_days)?;
        let text = self.model.generate(&request).await?;
        debug!(%tier, response_len = text.len(), "Model response received");
        decode_analysis(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{OverviewMetrics, PageMetric};
    use std::sync::Mutex;

    const VALID: &str = r#"{
        "summary": "Users grew 12%. Organic search led the gains.",
        "key_findings": ["/pricing drew 300 users", "Organic search is 54% of traffic", "Bounce rate held at 41%"],
        "top_performing_page": "/pricing",
        "strategic_recommendation": "Add a comparison table to /pricing."
    }"#;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            overview: OverviewMetrics {
                active_users: 1200.0,
                sessions: 1500.0,
                bounce_rate: 0.41,
            },
            top_content: vec![PageMetric {
                page_path: "/pricing".into(),
                active_users: 300.0,
            }],
            sources: Vec::new(),
        }
    }

    #[test]
    fn test_decode_plain_json() {
        let analysis = decode_analysis(VALID).unwrap();
        assert_eq!(analysis.top_performing_page, "/pricing");
        assert_eq!(analysis.key_findings.len(), 3);
    }

    #[test]
    fn test_decode_strips_code_fences() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert_eq!(decode_analysis(&fenced).unwrap(), decode_analysis(VALID).unwrap());

        let bare_fence = format!("```\n{}\n```\n", VALID);
        assert!(decode_analysis(&bare_fence).is_ok());

        let one_line = r#"```json {"summary":"s","key_findings":["a","b","c"],"top_performing_page":"/","strategic_recommendation":"r"}```"#;
        let decoded = decode_analysis(one_line).unwrap();
        assert_eq!(decoded.summary, "s");
        assert_eq!(decoded.top_performing_page, "/");
    }

    #[test]
    fn test_decode_rejects_empty_fence() {
        assert!(matches!(
            decode_analysis("```json\n```"),
            Err(AnalysisError::EmptyResponse)
        ));
    }

    #[test]
    fn test_decode_ignores_surrounding_prose() {
        let chatty = format!("Here is the analysis:\n{}\nLet me know!", VALID);
        assert!(decode_analysis(&chatty).is_ok());
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        assert!(matches!(decode_analysis("   "), Err(AnalysisError::EmptyResponse)));
        assert!(matches!(decode_analysis("```json\n```"), Err(AnalysisError::EmptyResponse)));
        assert!(matches!(
            decode_analysis("<h2>Executive Summary</h2>"),
            Err(AnalysisError::Malformed(_))
        ));
        assert!(matches!(
            decode_analysis(r#"{"summary": "x", "key_findings": "not a list"}"#),
            Err(AnalysisError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_two_findings() {
        let two = VALID.replace(", \"Bounce rate held at 41%\"", "");
        match decode_analysis(&two) {
            Err(AnalysisError::Invalid(msg)) => assert!(msg.contains("got 2")),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_carries_snapshot_tier_and_window() {
        let request = build_prompt(&snapshot(), SubscriptionTier::Pro, 7).unwrap();
        assert!(request.prompt.contains("last 7 days"));
        assert!(request.prompt.contains("Plan level: pro"));
        assert!(request.prompt.contains("detailed strategic advice"));
        assert!(request.prompt.contains("\"pagePath\": \"/pricing\""));
        assert!(request.system_instruction.contains("key_findings"));

        let free = build_prompt(&snapshot(), SubscriptionTier::Free, 30).unwrap();
        assert!(!free.prompt.contains("detailed strategic advice"));
    }

    struct CannedModel {
        reply: Result<String, UpstreamError>,
        seen: Mutex<Vec<PromptRequest>>,
    }

    #[async_trait]
    impl TextModel for CannedModel {
        async fn generate(&self, request: &PromptRequest) -> Result<String, UpstreamError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_generator_decodes_model_reply() {
        let model = Arc::new(CannedModel {
            reply: Ok(format!("```json\n{}\n```", VALID)),
            seen: Mutex::new(Vec::new()),
        });
        let generator = ModelInsightGenerator::new(model.clone());

        let analysis = generator
            .analyze(&snapshot(), SubscriptionTier::Max, 30)
            .await
            .unwrap();
        assert_eq!(analysis.summary, "Users grew 12%. Organic search led the gains.");
        assert_eq!(model.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generator_surfaces_upstream_error() {
        let model = Arc::new(CannedModel {
            reply: Err(UpstreamError::new("503 model overloaded")),
            seen: Mutex::new(Vec::new()),
        });
        let generator = ModelInsightGenerator::new(model);

        let err = generator
            .analyze(&snapshot(), SubscriptionTier::Free, 30)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Upstream(_)));
    }
}
