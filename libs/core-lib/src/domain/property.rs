use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("error") {
            ConnectionStatus::Error
        } else {
            ConnectionStatus::Connected
        }
    }
}

/// A tracked analytics source. Belongs to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Analytics-side identifier, e.g. `properties/123456`.
    pub external_id: String,
    pub display_name: String,
    pub website_url: Option<String>,
    pub industry: Option<String>,
    pub connection_status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
}

/// Onboarding input for a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInput {
    pub external_id: String,
    pub display_name: String,
    pub website_url: Option<String>,
    pub industry: Option<String>,
}

impl PropertyInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("Analytics property ID is required".into());
        }
        if self.display_name.trim().is_empty() {
            return Err("Property name is required".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_round_trips_through_str() {
        assert_eq!(ConnectionStatus::parse("error"), ConnectionStatus::Error);
        assert_eq!(ConnectionStatus::parse("connected"), ConnectionStatus::Connected);
        assert_eq!(ConnectionStatus::Error.as_str(), "error");
    }

    #[test]
    fn test_property_input_requires_id_and_name() {
        let mut input = PropertyInput {
            external_id: "properties/1".into(),
            display_name: "Blog".into(),
            website_url: None,
            industry: None,
        };
        assert!(input.validate().is_ok());

        input.display_name = " ".into();
        assert!(input.validate().unwrap_err().contains("name"));

        input.external_id = "".into();
        assert!(input.validate().unwrap_err().contains("property ID"));
    }
}
