use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use core_lib::scheduler::{CycleSummary, DueReportScheduler};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

pub const PROCESS_REPORTS_PATH: &str = "/api/cron/process-reports";
pub const CYCLE_FAILED_MESSAGE: &str = "Database error";

// Holds shared dependencies
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<DueReportScheduler>,
    pub cron_secret: Arc<str>,
}

#[derive(Serialize, Debug)]
pub struct CronResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: CycleSummary,
}

// --- Public Functions ---

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(PROCESS_REPORTS_PATH, get(process_reports_handler))
        .with_state(state)
}

// --- Handlers ---

fn is_authorized(headers: &HeaderMap, secret: &str) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    match value.strip_prefix("Bearer ") {
        Some(token) => {
            !secret.is_empty() && bool::from(token.as_bytes().ct_eq(secret.as_bytes()))
        }
        None => false,
    }
}

async fn process_reports_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !is_authorized(&headers, &state.cron_secret) {
        warn!("Rejected cron trigger with missing or wrong secret");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    info!("Cron trigger received");
    match state.scheduler.run_cycle(Utc::now()).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(CronResponse {
                success: true,
                summary,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Report cycle failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": CYCLE_FAILED_MESSAGE })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_secret_must_match() {
        assert!(is_authorized(&headers("Bearer s3cret"), "s3cret"));
        assert!(!is_authorized(&headers("Bearer wrong"), "s3cret"));
        assert!(!is_authorized(&headers("s3cret"), "s3cret"));
        assert!(!is_authorized(&headers("Basic s3cret"), "s3cret"));
        assert!(!is_authorized(&HeaderMap::new(), "s3cret"));
        // Prefix of the secret, different length
        assert!(!is_authorized(&headers("Bearer s3cre"), "s3cret"));
        assert!(!is_authorized(&headers("Bearer s3crets"), "s3cret"));
    }

    #[test]
    fn test_empty_secret_never_authorizes() {
        assert!(!is_authorized(&headers("Bearer "), ""));
    }
}
