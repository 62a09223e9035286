use crate::UpstreamError;
use serde::{Deserialize, Serialize};

/// Number of key findings every analysis must carry.
pub const KEY_FINDINGS_COUNT: usize = 3;

/// Structured analysis of one metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Dense two-sentence narrative.
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub top_performing_page: String,
    #[serde(default)]
    pub strategic_recommendation: String,
}

impl AnalysisResult {
    /// Checks the contract shape: non-empty summary, page and recommendation,
    /// and exactly [`KEY_FINDINGS_COUNT`] non-empty findings.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.summary.trim().is_empty() {
            return Err(AnalysisError::Invalid("summary is empty".into()));
        }
        if self.key_findings.len() != KEY_FINDINGS_COUNT {
            return Err(AnalysisError::Invalid(format!(
                "expected {} key findings, got {}",
                KEY_FINDINGS_COUNT,
                self.key_findings.len()
            )));
        }
        if self.key_findings.iter().any(|f| f.trim().is_empty()) {
            return Err(AnalysisError::Invalid("a key finding is empty".into()));
        }
        if self.top_performing_page.trim().is_empty() {
            return Err(AnalysisError::Invalid("top performing page is empty".into()));
        }
        if self.strategic_recommendation.trim().is_empty() {
            return Err(AnalysisError::Invalid(
                "strategic recommendation is empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("model returned no content")]
    EmptyResponse,
    #[error("model response is not valid analysis JSON: {0}")]
    Malformed(String),
    #[error("analysis failed validation: {0}")]
    Invalid(String),
    #[error("model request failed: {0}")]
    Upstream(#[from] UpstreamError),
}
