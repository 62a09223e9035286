// Storage adapters
pub mod in_memory_store;
pub mod postgres_store;

// Third-party collaborators
pub mod gemini;
pub mod google_analytics;
pub mod resend_notifier;

use crate::UpstreamError;

/// Turns a non-success HTTP response into an [`UpstreamError`], keeping the
/// JSON body as payload when the provider sent one.
pub(crate) async fn error_from_response(what: &str, response: reqwest::Response) -> UpstreamError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    upstream_error(what, status.as_u16(), &body)
}

pub(crate) fn upstream_error(what: &str, status: u16, body: &str) -> UpstreamError {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(payload) => {
            UpstreamError::with_payload(format!("{} returned status {}", what, status), payload)
        }
        Err(_) if body.trim().is_empty() => {
            UpstreamError::new(format!("{} returned status {}", what, status))
        }
        Err(_) => UpstreamError::new(format!(
            "{} returned status {}: {}",
            what,
            status,
            body.trim()
        )),
    }
}
