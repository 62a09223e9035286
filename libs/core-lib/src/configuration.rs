//! Saving a property together with its report settings, guarded by the
//! tenant's plan quota.

use crate::{
    CoreError, PropertyRepository, ScheduleRepository, TenantDirectory,
    domain::{
        property::{Property, PropertyInput},
        settings::{ReportSettings, SettingsInput},
        tenant::SubscriptionTier,
    },
    quota::QuotaPolicy,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("Your {tier} plan allows up to {max_properties} properties")]
    QuotaExceeded {
        tier: SubscriptionTier,
        max_properties: usize,
    },
    #[error("Your {tier} plan allows reports at most every {min_frequency_days} days")]
    FrequencyNotAllowed {
        tier: SubscriptionTier,
        min_frequency_days: u32,
    },
    #[error("{0}")]
    InvalidInput(String),
    #[error("Failed to save configuration: {0}")]
    Store(#[from] CoreError),
}

pub struct ConfigurationService {
    tenants: Arc<dyn TenantDirectory>,
    properties: Arc<dyn PropertyRepository>,
    schedules: Arc<dyn ScheduleRepository>,
    quota: QuotaPolicy,
}

impl ConfigurationService {
    pub fn new(
        tenants: Arc<dyn TenantDirectory>,
        properties: Arc<dyn PropertyRepository>,
        schedules: Arc<dyn ScheduleRepository>,
        quota: QuotaPolicy,
    ) -> Self {
        Self {
            tenants,
            properties,
            schedules,
            quota,
        }
    }

    /// Creates or updates a property and its settings for `tenant_id`.
    ///
    /// Nothing is written when a check fails. The saved settings are active and
    /// due at `now`, so the next cycle sends a report.
    pub async fn save_property_configuration(
        &self,
        tenant_id: Uuid,
        property: PropertyInput,
        settings: SettingsInput,
        now: DateTime<Utc>,
    ) -> Result<(Property, ReportSettings), ConfigurationError> {
        property.validate().map_err(ConfigurationError::InvalidInput)?;
        settings.validate().map_err(ConfigurationError::InvalidInput)?;

        let tier = self
            .tenants
            .tenant_profile(tenant_id)
            .await?
            .map(|p| p.tier)
            .unwrap_or_default();
        let limits = self.quota.limits(tier);

        let existing = self
            .properties
            .find_by_external_id(tenant_id, &property.external_id)
            .await?;
        if existing.is_none() {
            let owned = self.properties.count_for_tenant(tenant_id).await?;
            if owned >= limits.max_properties {
                warn!(%tenant_id, %tier, owned, "Property quota reached");
                return Err(ConfigurationError::QuotaExceeded {
                    tier,
                    max_properties: limits.max_properties,
                });
            }
        }
        if settings.frequency_days < limits.min_frequency_days {
            return Err(ConfigurationError::FrequencyNotAllowed {
                tier,
                min_frequency_days: limits.min_frequency_days,
            });
        }

        let saved = self.properties.upsert(tenant_id, &property, now).await?;
        let saved_settings = match self.schedules.upsert_settings(saved.id, &settings, now).await {
            Ok(s) => s,
            Err(e) => {
                if existing.is_none() {
                    // Roll back the property created above
                    if let Err(cleanup) = self.properties.delete(saved.id, tenant_id).await {
                        error!(
                            property_id = %saved.id,
                            error = %cleanup,
                            "Failed to remove property after settings write failed"
                        );
                    }
                }
                return Err(e.into());
            }
        };

        info!(
            %tenant_id,
            property_id = %saved.id,
            frequency_days = saved_settings.frequency_days,
            "Property configuration saved"
        );
        Ok((saved, saved_settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::in_memory_store::InMemoryStore,
        domain::settings::ComplexityLevel,
        processor::tests::{seed_tenant, ts},
    };
    use async_trait::async_trait;

    fn service(store: &Arc<InMemoryStore>) -> ConfigurationService {
        ConfigurationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            QuotaPolicy::default(),
        )
    }

    fn property(external_id: &str) -> PropertyInput {
        PropertyInput {
            external_id: external_id.into(),
            display_name: "Marketing site".into(),
            website_url: Some("https://example.com".into()),
            industry: Some("retail".into()),
        }
    }

    fn every(days: u32) -> SettingsInput {
        SettingsInput {
            frequency_days: days,
            complexity_level: ComplexityLevel::Detailed,
            include_recommendations: true,
        }
    }

    #[tokio::test]
    async fn test_save_creates_due_settings() {
        let store = Arc::new(InMemoryStore::default());
        let tenant = seed_tenant(&store, SubscriptionTier::Free, Some("refresh"));

        let (saved, settings) = service(&store)
            .save_property_configuration(tenant, property("properties/1"), every(30), ts(1))
            .await
            .unwrap();

        assert_eq!(saved.tenant_id, tenant);
        assert!(settings.is_active);
        assert_eq!(settings.next_send_at, Some(ts(1)));
        assert_eq!(store.due_reports(ts(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_free_plan_second_property_is_rejected() {
        let store = Arc::new(InMemoryStore::default());
        let tenant = seed_tenant(&store, SubscriptionTier::Free, Some("refresh"));
        let svc = service(&store);
        svc.save_property_configuration(tenant, property("properties/1"), every(30), ts(1))
            .await
            .unwrap();

        let err = svc
            .save_property_configuration(tenant, property("properties/2"), every(30), ts(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConfigurationError::QuotaExceeded { max_properties: 1, .. }
        ));
        assert_eq!(store.count_for_tenant(tenant).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_existing_property_can_be_updated_at_quota() {
        let store = Arc::new(InMemoryStore::default());
        let tenant = seed_tenant(&store, SubscriptionTier::Free, Some("refresh"));
        let svc = service(&store);
        let (first, _) = svc
            .save_property_configuration(tenant, property("properties/1"), every(30), ts(1))
            .await
            .unwrap();

        let mut renamed = property("properties/1");
        renamed.display_name = "Storefront".into();
        let (second, settings) = svc
            .save_property_configuration(tenant, renamed, every(30), ts(2))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "Storefront");
        assert_eq!(settings.next_send_at, Some(ts(2)));
    }

    #[tokio::test]
    async fn test_frequency_below_plan_minimum_is_rejected() {
        let store = Arc::new(InMemoryStore::default());
        let free = seed_tenant(&store, SubscriptionTier::Free, Some("refresh"));
        let pro = seed_tenant(&store, SubscriptionTier::Pro, Some("refresh"));
        let svc = service(&store);

        let err = svc
            .save_property_configuration(free, property("properties/1"), every(7), ts(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::FrequencyNotAllowed { min_frequency_days: 30, .. }
        ));
        assert_eq!(store.count_for_tenant(free).await.unwrap(), 0);

        assert!(svc
            .save_property_configuration(pro, property("properties/1"), every(7), ts(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let store = Arc::new(InMemoryStore::default());
        let tenant = seed_tenant(&store, SubscriptionTier::Max, Some("refresh"));
        let svc = service(&store);

        for days in [0, 31] {
            let err = svc
                .save_property_configuration(tenant, property("properties/1"), every(days), ts(1))
                .await
                .unwrap_err();
            assert!(matches!(err, ConfigurationError::InvalidInput(_)));
        }
        let err = svc
            .save_property_configuration(tenant, property("  "), every(7), ts(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Analytics property ID is required");
    }

    #[tokio::test]
    async fn test_save_reactivates_and_clears_error() {
        let store = Arc::new(InMemoryStore::default());
        let tenant = seed_tenant(&store, SubscriptionTier::Pro, Some("refresh"));
        let svc = service(&store);
        let (saved, settings) = svc
            .save_property_configuration(tenant, property("properties/1"), every(7), ts(1))
            .await
            .unwrap();
        store.deactivate(saved.id);
        store
            .update_schedule(
                settings.id,
                Some(ts(1)),
                &crate::domain::settings::ScheduleUpdate::failure(ts(1), 7, "boom", true),
            )
            .await
            .unwrap();

        let (_, settings) = svc
            .save_property_configuration(tenant, property("properties/1"), every(14), ts(3))
            .await
            .unwrap();

        assert!(settings.is_active);
        assert!(settings.last_error.is_none());
        assert_eq!(settings.frequency_days, 14);
        assert_eq!(settings.next_send_at, Some(ts(3)));
    }

    // Settings store that always fails, to exercise the compensating delete.
    struct BrokenSchedules;

    #[async_trait]
    impl ScheduleRepository for BrokenSchedules {
        async fn due_reports(
            &self,
            _now: DateTime<Utc>,
        ) -> Result<Vec<crate::domain::settings::DueReport>, CoreError> {
            Ok(Vec::new())
        }

        async fn settings_for(
            &self,
            _property_id: Uuid,
        ) -> Result<Option<ReportSettings>, CoreError> {
            Ok(None)
        }

        async fn upsert_settings(
            &self,
            _property_id: Uuid,
            _input: &SettingsInput,
            _next_send_at: DateTime<Utc>,
        ) -> Result<ReportSettings, CoreError> {
            Err(CoreError::Infrastructure("settings table unavailable".into()))
        }

        async fn update_schedule(
            &self,
            _settings_id: Uuid,
            _observed: Option<DateTime<Utc>>,
            _update: &crate::domain::settings::ScheduleUpdate,
        ) -> Result<bool, CoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_settings_failure_removes_new_property() {
        let store = Arc::new(InMemoryStore::default());
        let tenant = seed_tenant(&store, SubscriptionTier::Pro, Some("refresh"));
        let svc = ConfigurationService::new(
            store.clone(),
            store.clone(),
            Arc::new(BrokenSchedules),
            QuotaPolicy::default(),
        );

        let err = svc
            .save_property_configuration(tenant, property("properties/1"), every(7), ts(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigurationError::Store(_)));
        assert_eq!(store.count_for_tenant(tenant).await.unwrap(), 0);
    }
}
