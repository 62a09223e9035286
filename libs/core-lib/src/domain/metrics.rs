use serde::{Deserialize, Serialize};

/// Normalized analytics payload for one property and one reporting window.
/// Produced fresh per run; only persisted inside a report's audit snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub overview: OverviewMetrics,
    /// Ranked by active users, descending.
    pub top_content: Vec<PageMetric>,
    /// Ranked by active users, descending.
    pub sources: Vec<SourceMetric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewMetrics {
    pub active_users: f64,
    pub sessions: f64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetric {
    pub page_path: String,
    pub active_users: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetric {
    pub channel_group: String,
    pub active_users: f64,
}
