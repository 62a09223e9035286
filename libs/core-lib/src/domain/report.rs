use crate::domain::analysis::AnalysisResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_GENERATED: &str = "generated";

/// Report row as handed to the store. Append-only: never updated after insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub property_id: Uuid,
    pub tenant_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub html: Option<String>,
    pub analysis: Option<AnalysisResult>,
    /// Raw metrics plus analysis, kept as an audit snapshot.
    pub snapshot: Option<serde_json::Value>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub property_id: Uuid,
    pub tenant_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub html: Option<String>,
    pub analysis: Option<AnalysisResult>,
    pub snapshot: Option<serde_json::Value>,
    pub status: String,
}

impl Report {
    pub fn from_new(id: Uuid, new: NewReport) -> Self {
        Self {
            id,
            property_id: new.property_id,
            tenant_id: new.tenant_id,
            generated_at: new.generated_at,
            html: new.html,
            analysis: new.analysis,
            snapshot: new.snapshot,
            status: new.status,
        }
    }
}
