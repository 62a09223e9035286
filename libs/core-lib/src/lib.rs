use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use uuid::Uuid;

// Declare modules
pub mod adapters;
pub mod classify;
pub mod config;
pub mod configuration;
pub mod domain;
pub mod ga4;
pub mod insight;
pub mod processor;
pub mod quota;
pub mod render;
pub mod runtime;
pub mod scheduler;

use domain::{
    analysis::{AnalysisError, AnalysisResult},
    metrics::MetricsSnapshot,
    property::{ConnectionStatus, Property, PropertyInput},
    report::{NewReport, Report},
    settings::{DueReport, ReportSettings, ScheduleUpdate, SettingsInput},
    tenant::{AnalyticsCredential, SubscriptionTier, TenantProfile},
};
use render::ReportDocument;

// Define a common error type for the core library
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Infrastructure(Box::new(err))
    }
}

/// Failure reported by a third-party collaborator (analytics API, model API, mail API).
///
/// `payload` carries the structured error body when the provider returned one,
/// so that [`classify::classify`] can look past the message text.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            payload: Some(payload),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::new(err.to_string())
    }
}

// --- Storage ports ---

/// Read access to tenant profiles: delivery address, plan tier and analytics credential.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn tenant_profile(&self, tenant_id: Uuid) -> Result<Option<TenantProfile>, CoreError>;
}

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    /// Owned lookup: a property belonging to another tenant is reported as `None`.
    async fn find_owned(
        &self,
        property_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Property>, CoreError>;

    async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Property>, CoreError>;

    async fn count_for_tenant(&self, tenant_id: Uuid) -> Result<usize, CoreError>;

    /// Insert or update keyed by (tenant, external id). `now` becomes the
    /// creation timestamp of a newly inserted property.
    async fn upsert(
        &self,
        tenant_id: Uuid,
        input: &PropertyInput,
        now: DateTime<Utc>,
    ) -> Result<Property, CoreError>;

    async fn delete(&self, property_id: Uuid, tenant_id: Uuid) -> Result<(), CoreError>;

    async fn set_connection_status(
        &self,
        property_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<(), CoreError>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Active settings whose `next_send_at <= now`, joined with property and owner.
    async fn due_reports(&self, now: DateTime<Utc>) -> Result<Vec<DueReport>, CoreError>;

    async fn settings_for(&self, property_id: Uuid) -> Result<Option<ReportSettings>, CoreError>;

    async fn upsert_settings(
        &self,
        property_id: Uuid,
        input: &SettingsInput,
        next_send_at: DateTime<Utc>,
    ) -> Result<ReportSettings, CoreError>;

    /// Compare-and-set on `next_send_at`. Returns `false` when the row no longer
    /// carries `observed_next_send_at` (another cycle already rescheduled it).
    async fn update_schedule(
        &self,
        settings_id: Uuid,
        observed_next_send_at: Option<DateTime<Utc>>,
        update: &ScheduleUpdate,
    ) -> Result<bool, CoreError>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Single atomic insert; the returned row carries the assigned id.
    async fn insert_report(&self, report: NewReport) -> Result<Report, CoreError>;

    /// Newest first. Reports of a property owned by another tenant are never returned.
    async fn list_reports(&self, property_id: Uuid, tenant_id: Uuid)
    -> Result<Vec<Report>, CoreError>;
}

// --- Collaborator ports ---

#[async_trait]
pub trait MetricsFetcher: Send + Sync {
    async fn fetch(
        &self,
        credential: &AnalyticsCredential,
        external_property_id: &str,
    ) -> Result<MetricsSnapshot, UpstreamError>;
}

#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn analyze(
        &self,
        snapshot: &MetricsSnapshot,
        tier: SubscriptionTier,
        window_days: u32,
    ) -> Result<AnalysisResult, AnalysisError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, document: &ReportDocument) -> Result<(), UpstreamError>;
}
