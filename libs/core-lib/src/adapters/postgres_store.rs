use crate::{
    CoreError, PropertyRepository, ReportRepository, ScheduleRepository, TenantDirectory,
    domain::{
        analysis::AnalysisResult,
        property::{ConnectionStatus, Property, PropertyInput},
        report::{NewReport, Report},
        settings::{ComplexityLevel, DueReport, ReportSettings, ScheduleUpdate, SettingsInput},
        tenant::{AnalyticsCredential, SubscriptionTier, TenantProfile},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

// --- Row types matching the DB schema ---

#[derive(sqlx::FromRow, Debug)]
struct ProfileRow {
    id: Uuid,
    email: Option<String>,
    subscription_tier: Option<String>,
    google_refresh_token: Option<String>,
}

impl From<ProfileRow> for TenantProfile {
    fn from(row: ProfileRow) -> Self {
        TenantProfile {
            tenant_id: row.id,
            email: row.email,
            tier: SubscriptionTier::parse(row.subscription_tier.as_deref()),
            credential: row.google_refresh_token.and_then(AnalyticsCredential::new),
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct PropertyRow {
    id: Uuid,
    user_id: Uuid,
    ga_property_id: String,
    property_name: String,
    website_url: Option<String>,
    industry: Option<String>,
    connection_status: String,
    created_at: DateTime<Utc>,
}

impl From<PropertyRow> for Property {
    fn from(row: PropertyRow) -> Self {
        Property {
            id: row.id,
            tenant_id: row.user_id,
            external_id: row.ga_property_id,
            display_name: row.property_name,
            website_url: row.website_url,
            industry: row.industry,
            connection_status: ConnectionStatus::parse(&row.connection_status),
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct SettingsRow {
    id: Uuid,
    property_id: Uuid,
    frequency_days: i32,
    complexity_level: String,
    include_recommendations: bool,
    is_active: bool,
    last_sent_at: Option<DateTime<Utc>>,
    next_send_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl From<SettingsRow> for ReportSettings {
    fn from(row: SettingsRow) -> Self {
        ReportSettings {
            id: row.id,
            property_id: row.property_id,
            frequency_days: frequency_from_db(row.frequency_days),
            complexity_level: ComplexityLevel::parse(&row.complexity_level),
            include_recommendations: row.include_recommendations,
            is_active: row.is_active,
            last_sent_at: row.last_sent_at,
            next_send_at: row.next_send_at,
            last_error: row.last_error,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct DueRow {
    settings_id: Uuid,
    property_id: Uuid,
    user_id: Uuid,
    frequency_days: i32,
    next_send_at: Option<DateTime<Utc>>,
    property_created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug)]
struct ReportRow {
    id: Uuid,
    property_id: Uuid,
    user_id: Uuid,
    generated_at: DateTime<Utc>,
    ai_summary_html: Option<String>,
    ai_result: Option<Json<AnalysisResult>>,
    metrics_snapshot: Option<serde_json::Value>,
    status: String,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Report {
            id: row.id,
            property_id: row.property_id,
            tenant_id: row.user_id,
            generated_at: row.generated_at,
            html: row.ai_summary_html,
            analysis: row.ai_result.map(|Json(a)| a),
            snapshot: row.metrics_snapshot,
            status: row.status,
        }
    }
}

// The CHECK constraint keeps the column in 1..=30; clamp anything else to the floor.
fn frequency_from_db(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or(1).max(1)
}

const PROPERTY_COLUMNS: &str = "id, user_id, ga_property_id, property_name, website_url, industry, connection_status, created_at";
const SETTINGS_COLUMNS: &str = "id, property_id, frequency_days, complexity_level, include_recommendations, is_active, last_sent_at, next_send_at, last_error";

/// PostgreSQL implementation of the storage ports using sqlx.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PostgresStore {
    async fn tenant_profile(&self, tenant_id: Uuid) -> Result<Option<TenantProfile>, CoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, email, subscription_tier, google_refresh_token FROM profiles WHERE id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TenantProfile::from))
    }
}

#[async_trait]
impl PropertyRepository for PostgresStore {
    async fn find_owned(
        &self,
        property_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Property>, CoreError> {
        let query = format!(
            "SELECT {} FROM properties WHERE id = $1 AND user_id = $2",
            PROPERTY_COLUMNS
        );
        let row: Option<PropertyRow> = sqlx::query_as(&query)
            .bind(property_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Property::from))
    }

    async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Property>, CoreError> {
        let query = format!(
            "SELECT {} FROM properties WHERE user_id = $1 AND ga_property_id = $2",
            PROPERTY_COLUMNS
        );
        let row: Option<PropertyRow> = sqlx::query_as(&query)
            .bind(tenant_id)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Property::from))
    }

    async fn count_for_tenant(&self, tenant_id: Uuid) -> Result<usize, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM properties WHERE user_id = $1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn upsert(
        &self,
        tenant_id: Uuid,
        input: &PropertyInput,
        now: DateTime<Utc>,
    ) -> Result<Property, CoreError> {
        let query = format!(
            "INSERT INTO properties (id, user_id, ga_property_id, property_name, website_url, industry, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id, ga_property_id) DO UPDATE
             SET property_name = EXCLUDED.property_name,
                 website_url = EXCLUDED.website_url,
                 industry = EXCLUDED.industry
             RETURNING {}",
            PROPERTY_COLUMNS
        );
        let row: PropertyRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&input.external_id)
            .bind(&input.display_name)
            .bind(&input.website_url)
            .bind(&input.industry)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn delete(&self, property_id: Uuid, tenant_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM properties WHERE id = $1 AND user_id = $2")
            .bind(property_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_connection_status(
        &self,
        property_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE properties SET connection_status = $2 WHERE id = $1")
            .bind(property_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("property {}", property_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleRepository for PostgresStore {
    async fn due_reports(&self, now: DateTime<Utc>) -> Result<Vec<DueReport>, CoreError> {
        let rows: Vec<DueRow> = sqlx::query_as(
            "SELECT rs.id AS settings_id, rs.property_id, p.user_id, rs.frequency_days,
                    rs.next_send_at, p.created_at AS property_created_at
             FROM report_settings rs
             JOIN properties p ON p.id = rs.property_id
             JOIN profiles pr ON pr.id = p.user_id
             WHERE rs.is_active = TRUE AND rs.next_send_at <= $1
             ORDER BY p.created_at ASC, p.id ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DueReport {
                settings_id: row.settings_id,
                property_id: row.property_id,
                tenant_id: row.user_id,
                frequency_days: frequency_from_db(row.frequency_days),
                next_send_at: row.next_send_at,
                property_created_at: row.property_created_at,
            })
            .collect())
    }

    async fn settings_for(&self, property_id: Uuid) -> Result<Option<ReportSettings>, CoreError> {
        let query = format!(
            "SELECT {} FROM report_settings WHERE property_id = $1",
            SETTINGS_COLUMNS
        );
        let row: Option<SettingsRow> = sqlx::query_as(&query)
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ReportSettings::from))
    }

    async fn upsert_settings(
        &self,
        property_id: Uuid,
        input: &SettingsInput,
        next_send_at: DateTime<Utc>,
    ) -> Result<ReportSettings, CoreError> {
        let query = format!(
            "INSERT INTO report_settings
                (id, property_id, frequency_days, complexity_level, include_recommendations, is_active, next_send_at, last_error)
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, NULL)
             ON CONFLICT (property_id) DO UPDATE
             SET frequency_days = EXCLUDED.frequency_days,
                 complexity_level = EXCLUDED.complexity_level,
                 include_recommendations = EXCLUDED.include_recommendations,
                 is_active = TRUE,
                 next_send_at = EXCLUDED.next_send_at,
                 last_error = NULL
             RETURNING {}",
            SETTINGS_COLUMNS
        );
        let row: SettingsRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(property_id)
            .bind(input.frequency_days as i32)
            .bind(input.complexity_level.as_str())
            .bind(input.include_recommendations)
            .bind(next_send_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update_schedule(
        &self,
        settings_id: Uuid,
        observed_next_send_at: Option<DateTime<Utc>>,
        update: &ScheduleUpdate,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE report_settings
             SET last_sent_at = COALESCE($3, last_sent_at),
                 next_send_at = COALESCE($4, next_send_at),
                 last_error = $5
             WHERE id = $1 AND next_send_at IS NOT DISTINCT FROM $2",
        )
        .bind(settings_id)
        .bind(observed_next_send_at)
        .bind(update.last_sent_at)
        .bind(update.next_send_at)
        .bind(&update.last_error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ReportRepository for PostgresStore {
    async fn insert_report(&self, report: NewReport) -> Result<Report, CoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO reports (id, property_id, user_id, generated_at, ai_summary_html, ai_result, metrics_snapshot, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(report.property_id)
        .bind(report.tenant_id)
        .bind(report.generated_at)
        .bind(&report.html)
        .bind(report.analysis.as_ref().map(Json))
        .bind(&report.snapshot)
        .bind(&report.status)
        .execute(&self.pool)
        .await?;
        Ok(Report::from_new(id, report))
    }

    async fn list_reports(
        &self,
        property_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<Report>, CoreError> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            "SELECT r.id, r.property_id, r.user_id, r.generated_at, r.ai_summary_html,
                    r.ai_result, r.metrics_snapshot, r.status
             FROM reports r
             JOIN properties p ON p.id = r.property_id
             WHERE r.property_id = $1 AND p.user_id = $2
             ORDER BY r.generated_at DESC",
        )
        .bind(property_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }
}
