//! Analytics Data API (v1beta) report fetching.
//!
//! [`Ga4MetricsFetcher`] issues the three `runReport` calls a snapshot needs
//! and folds the responses into a [`MetricsSnapshot`]. The HTTP transport sits
//! behind [`AnalyticsDataApi`] so the folding logic is testable offline.

use crate::{
    MetricsFetcher, UpstreamError,
    domain::{
        metrics::{MetricsSnapshot, OverviewMetrics, PageMetric, SourceMetric},
        tenant::AnalyticsCredential,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const TOP_ROWS_LIMIT: u32 = 5;
const UNKNOWN_DIMENSION: &str = "Unknown";

// --- Wire types ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportRequest {
    pub date_ranges: Vec<DateRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<NamedField>,
    pub metrics: Vec<NamedField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_bys: Vec<OrderBy>,
    // int64 fields travel as strings in the JSON mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub metric: MetricOrderBy,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricOrderBy {
    pub metric_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReportResponse {
    #[serde(default)]
    pub rows: Vec<ReportRow>,
    #[serde(default)]
    pub totals: Vec<ReportRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub dimension_values: Vec<CellValue>,
    #[serde(default)]
    pub metric_values: Vec<CellValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CellValue {
    #[serde(default)]
    pub value: Option<String>,
}

// --- Request builders ---

fn named(names: &[&str]) -> Vec<NamedField> {
    names
        .iter()
        .map(|n| NamedField {
            name: (*n).to_string(),
        })
        .collect()
}

fn window(window_days: u32) -> Vec<DateRange> {
    vec![DateRange {
        start_date: format!("{}daysAgo", window_days),
        end_date: "today".to_string(),
    }]
}

fn top_by_active_users(dimension: &str, window_days: u32) -> RunReportRequest {
    RunReportRequest {
        date_ranges: window(window_days),
        dimensions: named(&[dimension]),
        metrics: named(&["activeUsers"]),
        order_bys: vec![OrderBy {
            metric: MetricOrderBy {
                metric_name: "activeUsers".to_string(),
            },
            desc: true,
        }],
        limit: Some(TOP_ROWS_LIMIT.to_string()),
    }
}

pub fn overview_request(window_days: u32) -> RunReportRequest {
    RunReportRequest {
        date_ranges: window(window_days),
        dimensions: Vec::new(),
        metrics: named(&["activeUsers", "sessions", "bounceRate"]),
        order_bys: Vec::new(),
        limit: None,
    }
}

pub fn top_content_request(window_days: u32) -> RunReportRequest {
    top_by_active_users("pagePath", window_days)
}

pub fn sources_request(window_days: u32) -> RunReportRequest {
    top_by_active_users("sessionDefaultChannelGroup", window_days)
}

/// Resource name for a property id; bare numeric ids get the `properties/` prefix.
pub fn property_resource(external_id: &str) -> String {
    let trimmed = external_id.trim();
    if trimmed.starts_with("properties/") {
        trimmed.to_string()
    } else {
        format!("properties/{}", trimmed)
    }
}

// --- Normalization ---

fn number(cell: Option<&CellValue>) -> f64 {
    cell.and_then(|c| c.value.as_deref())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn dimension(cell: Option<&CellValue>) -> String {
    match cell.and_then(|c| c.value.as_deref()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN_DIMENSION.to_string(),
    }
}

/// Folds the three responses into a snapshot. Missing numbers read as 0 and
/// missing dimension labels as `"Unknown"`.
pub fn normalize(
    overview: &RunReportResponse,
    top_content: &RunReportResponse,
    sources: &RunReportResponse,
) -> MetricsSnapshot {
    // Totals are only present when aggregations were requested; fall back to the single row.
    let totals = overview.totals.first().or_else(|| overview.rows.first());
    let metric = |i: usize| number(totals.and_then(|row| row.metric_values.get(i)));

    MetricsSnapshot {
        overview: OverviewMetrics {
            active_users: metric(0),
            sessions: metric(1),
            bounce_rate: metric(2),
        },
        top_content: top_content
            .rows
            .iter()
            .map(|row| PageMetric {
                page_path: dimension(row.dimension_values.first()),
                active_users: number(row.metric_values.first()),
            })
            .collect(),
        sources: sources
            .rows
            .iter()
            .map(|row| SourceMetric {
                channel_group: dimension(row.dimension_values.first()),
                active_users: number(row.metric_values.first()),
            })
            .collect(),
    }
}

// --- Fetcher ---

/// Transport for the Analytics Data API.
#[async_trait]
pub trait AnalyticsDataApi: Send + Sync {
    /// Exchanges the stored refresh credential for a short-lived access token.
    async fn access_token(&self, credential: &AnalyticsCredential) -> Result<String, UpstreamError>;

    async fn run_report(
        &self,
        access_token: &str,
        property: &str,
        request: &RunReportRequest,
    ) -> Result<RunReportResponse, UpstreamError>;
}

pub struct Ga4MetricsFetcher {
    api: Arc<dyn AnalyticsDataApi>,
    window_days: u32,
}

impl Ga4MetricsFetcher {
    pub fn new(api: Arc<dyn AnalyticsDataApi>, window_days: u32) -> Self {
        Self { api, window_days }
    }
}

#[async_trait]
impl MetricsFetcher for Ga4MetricsFetcher {
    async fn fetch(
        &self,
        credential: &AnalyticsCredential,
        external_property_id: &str,
    ) -> Result<MetricsSnapshot, UpstreamError> {
        let property = property_resource(external_property_id);
        let token = self.api.access_token(credential).await?;

        let overview_req = overview_request(self.window_days);
        let content_req = top_content_request(self.window_days);
        let sources_req = sources_request(self.window_days);
        let (overview, top_content, sources) = tokio::try_join!(
            self.api.run_report(&token, &property, &overview_req),
            self.api.run_report(&token, &property, &content_req),
            self.api.run_report(&token, &property, &sources_req),
        )?;

        debug!(
            %property,
            content_rows = top_content.rows.len(),
            source_rows = sources.rows.len(),
            "Analytics reports fetched"
        );
        Ok(normalize(&overview, &top_content, &sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn response(value: serde_json::Value) -> RunReportResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_requests_serialize_to_api_shape() {
        let body = serde_json::to_value(top_content_request(30)).unwrap();
        assert_eq!(
            body,
            json!({
                "dateRanges": [{"startDate": "30daysAgo", "endDate": "today"}],
                "dimensions": [{"name": "pagePath"}],
                "metrics": [{"name": "activeUsers"}],
                "orderBys": [{"metric": {"metricName": "activeUsers"}, "desc": true}],
                "limit": "5"
            })
        );

        let body = serde_json::to_value(overview_request(7)).unwrap();
        assert_eq!(body["dateRanges"][0]["startDate"], "7daysAgo");
        assert!(body.get("dimensions").is_none());
        assert!(body.get("limit").is_none());
        assert_eq!(body["metrics"].as_array().unwrap().len(), 3);

        let body = serde_json::to_value(sources_request(30)).unwrap();
        assert_eq!(body["dimensions"][0]["name"], "sessionDefaultChannelGroup");
    }

    #[test]
    fn test_property_resource_prefix() {
        assert_eq!(property_resource("123456"), "properties/123456");
        assert_eq!(property_resource("properties/123456"), "properties/123456");
    }

    #[test]
    fn test_normalize_reads_totals_and_rows() {
        let overview = response(json!({
            "totals": [{"metricValues": [{"value": "1200"}, {"value": "1500"}, {"value": "0.41"}]}]
        }));
        let content = response(json!({
            "rows": [
                {"dimensionValues": [{"value": "/pricing"}], "metricValues": [{"value": "300"}]},
                {"dimensionValues": [{"value": "/"}], "metricValues": [{"value": "250"}]}
            ]
        }));
        let sources = response(json!({
            "rows": [{"dimensionValues": [{"value": "Organic Search"}], "metricValues": [{"value": "640"}]}]
        }));

        let snapshot = normalize(&overview, &content, &sources);
        assert_eq!(snapshot.overview.active_users, 1200.0);
        assert_eq!(snapshot.overview.sessions, 1500.0);
        assert_eq!(snapshot.overview.bounce_rate, 0.41);
        assert_eq!(snapshot.top_content.len(), 2);
        assert_eq!(snapshot.top_content[0].page_path, "/pricing");
        assert_eq!(snapshot.sources[0].channel_group, "Organic Search");
        assert_eq!(snapshot.sources[0].active_users, 640.0);
    }

    #[test]
    fn test_normalize_defaults_missing_values() {
        let overview = response(json!({}));
        let content = response(json!({
            "rows": [{"dimensionValues": [], "metricValues": [{"value": "not-a-number"}]}]
        }));
        let sources = response(json!({"rows": [{}]}));

        let snapshot = normalize(&overview, &content, &sources);
        assert_eq!(snapshot.overview, OverviewMetrics::default());
        assert_eq!(snapshot.top_content[0].page_path, "Unknown");
        assert_eq!(snapshot.top_content[0].active_users, 0.0);
        assert_eq!(snapshot.sources[0].channel_group, "Unknown");
    }

    #[test]
    fn test_normalize_falls_back_to_first_row() {
        let overview = response(json!({
            "rows": [{"metricValues": [{"value": "10"}, {"value": "12"}, {"value": "0.5"}]}]
        }));
        let empty = RunReportResponse::default();
        let snapshot = normalize(&overview, &empty, &empty);
        assert_eq!(snapshot.overview.sessions, 12.0);
        assert!(snapshot.top_content.is_empty());
        assert!(snapshot.sources.is_empty());
    }

    // --- Fetcher with a scripted transport ---

    #[derive(Default)]
    struct ScriptedApi {
        token_error: Option<UpstreamError>,
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl AnalyticsDataApi for ScriptedApi {
        async fn access_token(
            &self,
            credential: &AnalyticsCredential,
        ) -> Result<String, UpstreamError> {
            match &self.token_error {
                Some(err) => Err(err.clone()),
                None => Ok(format!("access-for-{}", credential.expose())),
            }
        }

        async fn run_report(
            &self,
            access_token: &str,
            property: &str,
            request: &RunReportRequest,
        ) -> Result<RunReportResponse, UpstreamError> {
            let dimension = request.dimensions.first().map(|d| d.name.clone());
            self.calls
                .lock()
                .unwrap()
                .push((access_token.to_string(), property.to_string(), dimension.clone()));
            let body = match dimension.as_deref() {
                None => json!({"totals": [{"metricValues": [{"value": "5"}, {"value": "6"}, {"value": "0.2"}]}]}),
                Some("pagePath") => json!({"rows": [{"dimensionValues": [{"value": "/a"}], "metricValues": [{"value": "4"}]}]}),
                Some(_) => json!({"rows": [{"dimensionValues": [{"value": "Direct"}], "metricValues": [{"value": "3"}]}]}),
            };
            Ok(serde_json::from_value(body).unwrap())
        }
    }

    #[tokio::test]
    async fn test_fetcher_runs_three_reports_with_one_token() {
        let api = Arc::new(ScriptedApi::default());
        let fetcher = Ga4MetricsFetcher::new(api.clone(), 30);
        let credential = AnalyticsCredential::new("refresh").unwrap();

        let snapshot = fetcher.fetch(&credential, "42").await.unwrap();
        assert_eq!(snapshot.overview.active_users, 5.0);
        assert_eq!(snapshot.top_content[0].page_path, "/a");
        assert_eq!(snapshot.sources[0].channel_group, "Direct");

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(token, property, _)| {
            token == "access-for-refresh" && property == "properties/42"
        }));
    }

    #[tokio::test]
    async fn test_fetcher_surfaces_token_error_payload() {
        let api = Arc::new(ScriptedApi {
            token_error: Some(UpstreamError::with_payload(
                "token endpoint returned 400",
                json!({"error": "invalid_grant"}),
            )),
            ..ScriptedApi::default()
        });
        let fetcher = Ga4MetricsFetcher::new(api.clone(), 30);
        let credential = AnalyticsCredential::new("refresh").unwrap();

        let err = fetcher.fetch(&credential, "42").await.unwrap_err();
        assert_eq!(err.payload, Some(json!({"error": "invalid_grant"})));
        assert!(api.calls.lock().unwrap().is_empty());
    }
}
