use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Subscription tier ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Max,
}

impl SubscriptionTier {
    /// Parses the stored tier string. Unknown or missing values fall back to
    /// `Free` so a corrupt row never grants more than the base allowance.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("pro") => SubscriptionTier::Pro,
            Some("max") => SubscriptionTier::Max,
            _ => SubscriptionTier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Max => "max",
        }
    }

    /// Paid tiers get the deeper strategic section in generated analyses.
    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Credential ---

/// Stored analytics refresh credential. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct AnalyticsCredential(String);

impl AnalyticsCredential {
    /// Blank tokens are treated as "no credential".
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AnalyticsCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AnalyticsCredential(***)")
    }
}

// --- Tenant profile ---

#[derive(Debug, Clone)]
pub struct TenantProfile {
    pub tenant_id: Uuid,
    pub email: Option<String>,
    pub tier: SubscriptionTier,
    pub credential: Option<AnalyticsCredential>,
}

impl TenantProfile {
    /// Delivery address, if one is configured and non-blank.
    pub fn delivery_address(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tiers() {
        assert_eq!(SubscriptionTier::parse(Some("free")), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::parse(Some("pro")), SubscriptionTier::Pro);
        assert_eq!(SubscriptionTier::parse(Some(" MAX ")), SubscriptionTier::Max);
    }

    #[test]
    fn test_parse_unknown_tier_is_free() {
        assert_eq!(SubscriptionTier::parse(None), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::parse(Some("enterprise")), SubscriptionTier::Free);
        assert_eq!(SubscriptionTier::parse(Some("")), SubscriptionTier::Free);
    }

    #[test]
    fn test_blank_credential_is_none() {
        assert!(AnalyticsCredential::new("   ").is_none());
        let cred = AnalyticsCredential::new("1//refresh").unwrap();
        assert_eq!(cred.expose(), "1//refresh");
        assert_eq!(format!("{:?}", cred), "AnalyticsCredential(***)");
    }

    #[test]
    fn test_delivery_address_ignores_blank_email() {
        let mut profile = TenantProfile {
            tenant_id: Uuid::new_v4(),
            email: Some("  ".to_string()),
            tier: SubscriptionTier::Free,
            credential: None,
        };
        assert_eq!(profile.delivery_address(), None);
        profile.email = Some("owner@example.com".to_string());
        assert_eq!(profile.delivery_address(), Some("owner@example.com"));
    }
}
