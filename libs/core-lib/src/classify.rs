use crate::UpstreamError;
use serde_json::Value;

/// Provider error codes meaning the stored grant is dead (revoked, expired, or
/// issued to a client that is no longer authorized). New provider shapes go here.
const CREDENTIAL_REVOKED_MARKERS: &[&str] = &["invalid_grant", "unauthorized_client"];

// Payloads are provider JSON; nothing legitimate nests deeper than this.
const MAX_PAYLOAD_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    CredentialRevoked,
    Transient,
}

impl FailureClass {
    pub fn is_credential_revoked(&self) -> bool {
        matches!(self, FailureClass::CredentialRevoked)
    }
}

/// Classifies an upstream failure by its message and structured payload.
pub fn classify(err: &UpstreamError) -> FailureClass {
    if contains_marker(&err.message) {
        return FailureClass::CredentialRevoked;
    }
    match &err.payload {
        Some(payload) if payload_has_marker(payload, 0) => FailureClass::CredentialRevoked,
        _ => FailureClass::Transient,
    }
}

fn contains_marker(text: &str) -> bool {
    CREDENTIAL_REVOKED_MARKERS
        .iter()
        .any(|marker| text.contains(marker))
}

fn payload_has_marker(value: &Value, depth: usize) -> bool {
    if depth > MAX_PAYLOAD_DEPTH {
        return false;
    }
    match value {
        Value::String(s) => contains_marker(s),
        Value::Array(items) => items.iter().any(|v| payload_has_marker(v, depth + 1)),
        Value::Object(map) => map.values().any(|v| payload_has_marker(v, depth + 1)),
        _ => false,
    }
}
