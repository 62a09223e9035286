use crate::{
    CoreError, PropertyRepository, ReportRepository, ScheduleRepository, TenantDirectory,
    domain::{
        property::{ConnectionStatus, Property, PropertyInput},
        report::{NewReport, Report},
        settings::{DueReport, ReportSettings, ScheduleUpdate, SettingsInput},
        tenant::TenantProfile,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use uuid::Uuid;

/// In-memory implementation of every storage port, for tests and local runs.
/// Each map is keyed by the row id, mirroring the relational tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    profiles: Arc<DashMap<Uuid, TenantProfile>>,
    properties: Arc<DashMap<Uuid, Property>>,
    // property_id -> settings (one-to-one)
    settings: Arc<DashMap<Uuid, ReportSettings>>,
    reports: Arc<DashMap<Uuid, Report>>,
    // Failure switches for exercising error paths
    fail_due_query: Arc<AtomicBool>,
    fail_report_inserts: Arc<AtomicBool>,
    fail_schedule_updates: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn insert_profile(&self, profile: TenantProfile) {
        self.profiles.insert(profile.tenant_id, profile);
    }

    /// Settings row by its own id (the trait looks settings up by property).
    pub fn settings_by_id(&self, settings_id: Uuid) -> Option<ReportSettings> {
        self.settings
            .iter()
            .find(|entry| entry.value().id == settings_id)
            .map(|entry| entry.value().clone())
    }

    pub fn deactivate(&self, property_id: Uuid) {
        if let Some(mut settings) = self.settings.get_mut(&property_id) {
            settings.is_active = false;
        }
    }

    pub fn set_fail_due_query(&self, fail: bool) {
        self.fail_due_query.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_report_inserts(&self, fail: bool) {
        self.fail_report_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_schedule_updates(&self, fail: bool) {
        self.fail_schedule_updates.store(fail, Ordering::SeqCst);
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }
}

fn injected_failure(what: &str) -> CoreError {
    CoreError::Infrastructure(format!("injected failure: {}", what).into())
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn tenant_profile(&self, tenant_id: Uuid) -> Result<Option<TenantProfile>, CoreError> {
        Ok(self.profiles.get(&tenant_id).map(|p| p.value().clone()))
    }
}

#[async_trait]
impl PropertyRepository for InMemoryStore {
    async fn find_owned(
        &self,
        property_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Property>, CoreError> {
        Ok(self
            .properties
            .get(&property_id)
            .filter(|p| p.tenant_id == tenant_id)
            .map(|p| p.value().clone()))
    }

    async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Property>, CoreError> {
        Ok(self
            .properties
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.external_id == external_id)
            .map(|p| p.value().clone()))
    }

    async fn count_for_tenant(&self, tenant_id: Uuid) -> Result<usize, CoreError> {
        Ok(self
            .properties
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .count())
    }

    async fn upsert(
        &self,
        tenant_id: Uuid,
        input: &PropertyInput,
        now: DateTime<Utc>,
    ) -> Result<Property, CoreError> {
        if let Some(existing) = self.find_by_external_id(tenant_id, &input.external_id).await? {
            let mut entry = self
                .properties
                .get_mut(&existing.id)
                .ok_or_else(|| CoreError::NotFound(existing.id.to_string()))?;
            entry.display_name = input.display_name.clone();
            entry.website_url = input.website_url.clone();
            entry.industry = input.industry.clone();
            return Ok(entry.value().clone());
        }

        let property = Property {
            id: Uuid::new_v4(),
            tenant_id,
            external_id: input.external_id.clone(),
            display_name: input.display_name.clone(),
            website_url: input.website_url.clone(),
            industry: input.industry.clone(),
            connection_status: ConnectionStatus::Connected,
            created_at: now,
        };
        self.properties.insert(property.id, property.clone());
        Ok(property)
    }

    async fn delete(&self, property_id: Uuid, tenant_id: Uuid) -> Result<(), CoreError> {
        let removed = self
            .properties
            .remove_if(&property_id, |_, p| p.tenant_id == tenant_id);
        if removed.is_some() {
            // Cascade, as the relational schema does
            self.settings.remove(&property_id);
            self.reports.retain(|_, r| r.property_id != property_id);
        }
        Ok(())
    }

    async fn set_connection_status(
        &self,
        property_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<(), CoreError> {
        match self.properties.get_mut(&property_id) {
            Some(mut property) => {
                property.connection_status = status;
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("property {}", property_id))),
        }
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryStore {
    async fn due_reports(&self, now: DateTime<Utc>) -> Result<Vec<DueReport>, CoreError> {
        if self.fail_due_query.load(Ordering::SeqCst) {
            return Err(injected_failure("due report query"));
        }
        let mut due: Vec<DueReport> = self
            .settings
            .iter()
            .filter(|s| s.is_active && s.next_send_at.is_some_and(|at| at <= now))
            .filter_map(|s| {
                // Inner join: settings without a property are not due
                self.properties.get(&s.property_id).map(|p| DueReport {
                    settings_id: s.id,
                    property_id: p.id,
                    tenant_id: p.tenant_id,
                    frequency_days: s.frequency_days,
                    next_send_at: s.next_send_at,
                    property_created_at: p.created_at,
                })
            })
            .collect();
        due.sort_by_key(|d| (d.property_created_at, d.property_id));
        Ok(due)
    }

    async fn settings_for(&self, property_id: Uuid) -> Result<Option<ReportSettings>, CoreError> {
        Ok(self.settings.get(&property_id).map(|s| s.value().clone()))
    }

    async fn upsert_settings(
        &self,
        property_id: Uuid,
        input: &SettingsInput,
        next_send_at: DateTime<Utc>,
    ) -> Result<ReportSettings, CoreError> {
        if !self.properties.contains_key(&property_id) {
            return Err(CoreError::NotFound(format!("property {}", property_id)));
        }
        let mut entry = self
            .settings
            .entry(property_id)
            .or_insert_with(|| ReportSettings {
                id: Uuid::new_v4(),
                property_id,
                frequency_days: input.frequency_days,
                complexity_level: input.complexity_level,
                include_recommendations: input.include_recommendations,
                is_active: true,
                last_sent_at: None,
                next_send_at: None,
                last_error: None,
            });
        let settings = entry.value_mut();
        settings.frequency_days = input.frequency_days;
        settings.complexity_level = input.complexity_level;
        settings.include_recommendations = input.include_recommendations;
        settings.is_active = true;
        settings.next_send_at = Some(next_send_at);
        settings.last_error = None;
        Ok(settings.clone())
    }

    async fn update_schedule(
        &self,
        settings_id: Uuid,
        observed_next_send_at: Option<DateTime<Utc>>,
        update: &ScheduleUpdate,
    ) -> Result<bool, CoreError> {
        if self.fail_schedule_updates.load(Ordering::SeqCst) {
            return Err(injected_failure("schedule update"));
        }
        for mut entry in self.settings.iter_mut() {
            let settings = entry.value_mut();
            if settings.id != settings_id {
                continue;
            }
            // Compare-and-set guard
            if settings.next_send_at != observed_next_send_at {
                return Ok(false);
            }
            if let Some(at) = update.last_sent_at {
                settings.last_sent_at = Some(at);
            }
            if let Some(at) = update.next_send_at {
                settings.next_send_at = Some(at);
            }
            settings.last_error = update.last_error.clone();
            return Ok(true);
        }
        Err(CoreError::NotFound(format!("report settings {}", settings_id)))
    }
}

#[async_trait]
impl ReportRepository for InMemoryStore {
    async fn insert_report(&self, report: NewReport) -> Result<Report, CoreError> {
        if self.fail_report_inserts.load(Ordering::SeqCst) {
            return Err(injected_failure("report insert"));
        }
        let report = Report::from_new(Uuid::new_v4(), report);
        self.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn list_reports(
        &self,
        property_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<Report>, CoreError> {
        let mut reports: Vec<Report> = self
            .reports
            .iter()
            .filter(|r| r.property_id == property_id && r.tenant_id == tenant_id)
            .map(|r| r.value().clone())
            .collect();
        reports.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(reports)
    }
}
