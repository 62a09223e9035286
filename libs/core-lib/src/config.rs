//! Process configuration from environment variables.

use crate::{
    CoreError,
    adapters::gemini::DEFAULT_GEMINI_MODEL,
    domain::settings::MAX_FREQUENCY_DAYS,
    quota::{QuotaPolicy, TierLimits},
    scheduler::DEFAULT_TENANT_CONCURRENCY,
};
use std::{str::FromStr, time::Duration};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_FROM_ADDRESS: &str = "Analytics Reports <onboarding@resend.dev>";
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Shared secret of the cron trigger; the gateway refuses to start without it.
    pub cron_secret: Option<String>,
    pub listen_addr: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    /// `None` disables email delivery.
    pub resend_api_key: Option<String>,
    pub report_from_address: String,
    pub app_url: String,
    pub tenant_concurrency: usize,
    pub report_window_days: u32,
    pub http_timeout: Duration,
    pub quota: QuotaPolicy,
}

impl WorkerConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| CoreError::Configuration("DATABASE_URL must be set".into()))?;

        let report_window_days: u32 = parse_or(&get, "REPORT_WINDOW_DAYS", 30)?;
        if report_window_days == 0 {
            return Err(CoreError::Configuration(
                "REPORT_WINDOW_DAYS must be at least 1".into(),
            ));
        }

        let defaults = QuotaPolicy::default();
        let quota = QuotaPolicy {
            free: tier_limits(&get, "FREE", defaults.free)?,
            pro: tier_limits(&get, "PRO", defaults.pro)?,
            max: tier_limits(&get, "MAX", defaults.max)?,
        };

        Ok(Self {
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
            cron_secret: get("CRON_SECRET"),
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            google_client_id: get("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: get("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            resend_api_key: get("RESEND_API_KEY"),
            report_from_address: get("REPORT_FROM_ADDRESS")
                .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            app_url: get("APP_URL").unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
            tenant_concurrency: parse_or::<usize>(
                &get,
                "TENANT_CONCURRENCY",
                DEFAULT_TENANT_CONCURRENCY,
            )?
            .max(1),
            report_window_days,
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 30)?),
            quota,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| CoreError::Configuration(format!("Invalid value for {}: {}", key, e))),
        None => Ok(default),
    }
}

fn tier_limits(
    get: &impl Fn(&str) -> Option<String>,
    tier: &str,
    defaults: TierLimits,
) -> Result<TierLimits, CoreError> {
    let max_key = format!("QUOTA_{}_MAX_PROPERTIES", tier);
    let freq_key = format!("QUOTA_{}_MIN_FREQUENCY_DAYS", tier);
    let limits = TierLimits {
        max_properties: parse_or(get, &max_key, defaults.max_properties)?,
        min_frequency_days: parse_or(get, &freq_key, defaults.min_frequency_days)?,
    };
    if limits.min_frequency_days == 0 || limits.min_frequency_days > MAX_FREQUENCY_DAYS {
        return Err(CoreError::Configuration(format!(
            "{} must be between 1 and {}",
            freq_key, MAX_FREQUENCY_DAYS
        )));
    }
    Ok(limits)
}
