use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_FREQUENCY_DAYS: u32 = 1;
pub const MAX_FREQUENCY_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    #[default]
    Simple,
    Detailed,
}

impl ComplexityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Simple => "simple",
            ComplexityLevel::Detailed => "detailed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("detailed") {
            ComplexityLevel::Detailed
        } else {
            ComplexityLevel::Simple
        }
    }
}

/// Delivery schedule of one property (one-to-one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub id: Uuid,
    pub property_id: Uuid,
    pub frequency_days: u32,
    pub complexity_level: ComplexityLevel,
    pub include_recommendations: bool,
    pub is_active: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_send_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsInput {
    pub frequency_days: u32,
    pub complexity_level: ComplexityLevel,
    pub include_recommendations: bool,
}

impl SettingsInput {
    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_FREQUENCY_DAYS..=MAX_FREQUENCY_DAYS).contains(&self.frequency_days) {
            return Err(format!(
                "Report frequency must be between {} and {} days",
                MIN_FREQUENCY_DAYS, MAX_FREQUENCY_DAYS
            ));
        }
        Ok(())
    }
}

impl Default for SettingsInput {
    fn default() -> Self {
        Self {
            frequency_days: MAX_FREQUENCY_DAYS,
            complexity_level: ComplexityLevel::Simple,
            include_recommendations: false,
        }
    }
}

/// One row of the due-report query.
#[derive(Debug, Clone, PartialEq)]
pub struct DueReport {
    pub settings_id: Uuid,
    pub property_id: Uuid,
    pub tenant_id: Uuid,
    pub frequency_days: u32,
    /// Value observed by the query; used as the compare-and-set guard.
    pub next_send_at: Option<DateTime<Utc>>,
    pub property_created_at: DateTime<Utc>,
}

/// Write applied to a settings row after a processing attempt.
///
/// `None` in `last_sent_at`/`next_send_at` keeps the stored value;
/// `last_error` is always written (`None` clears it).
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleUpdate {
    pub last_sent_at: Option<DateTime<Utc>>,
    pub next_send_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ScheduleUpdate {
    pub fn success(now: DateTime<Utc>, frequency_days: u32) -> Self {
        Self {
            last_sent_at: Some(now),
            next_send_at: Some(next_send_after(now, frequency_days)),
            last_error: None,
        }
    }

    /// `advance` is false for permanent failures: the row stays due so the
    /// error remains visible instead of being silently retried later.
    pub fn failure(
        now: DateTime<Utc>,
        frequency_days: u32,
        message: impl Into<String>,
        advance: bool,
    ) -> Self {
        Self {
            last_sent_at: None,
            next_send_at: advance.then(|| next_send_after(now, frequency_days)),
            last_error: Some(message.into()),
        }
    }
}

pub fn next_send_after(now: DateTime<Utc>, frequency_days: u32) -> DateTime<Utc> {
    now + Duration::days(i64::from(frequency_days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_success_update_advances_and_clears_error() {
        let update = ScheduleUpdate::success(at(1), 7);
        assert_eq!(update.last_sent_at, Some(at(1)));
        assert_eq!(update.next_send_at, Some(at(8)));
        assert_eq!(update.last_error, None);
    }

    #[test]
    fn test_failure_update_respects_advance_flag() {
        let transient = ScheduleUpdate::failure(at(1), 3, "boom", true);
        assert_eq!(transient.next_send_at, Some(at(4)));
        assert_eq!(transient.last_sent_at, None);
        assert_eq!(transient.last_error.as_deref(), Some("boom"));

        let permanent = ScheduleUpdate::failure(at(1), 3, "no credential", false);
        assert_eq!(permanent.next_send_at, None);
    }

    #[test]
    fn test_frequency_bounds() {
        let mut input = SettingsInput::default();
        assert!(input.validate().is_ok());
        input.frequency_days = 0;
        assert!(input.validate().is_err());
        input.frequency_days = 31;
        assert!(input.validate().is_err());
        input.frequency_days = 1;
        assert!(input.validate().is_ok());
    }
}
