//! Due-report scheduler: one batch cycle over every due report.
//!
//! Per-tenant quota selection is computed before any work is dispatched.
//! Tenants then run concurrently (bounded), while the items of one tenant run
//! one after another.

use crate::{
    CoreError, ScheduleRepository, TenantDirectory,
    domain::{
        settings::{DueReport, ScheduleUpdate},
        tenant::SubscriptionTier,
    },
    processor::{ProcessingError, ReportProcessor},
    quota::{QuotaPolicy, select_within_allowance},
};
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_TENANT_CONCURRENCY: usize = 4;

/// Aggregate outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub processed: usize,
    pub errors: usize,
    pub skipped: usize,
}

pub struct DueReportScheduler {
    schedules: Arc<dyn ScheduleRepository>,
    tenants: Arc<dyn TenantDirectory>,
    processor: Arc<ReportProcessor>,
    quota: QuotaPolicy,
    tenant_concurrency: usize,
}

impl DueReportScheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        tenants: Arc<dyn TenantDirectory>,
        processor: Arc<ReportProcessor>,
    ) -> Self {
        Self {
            schedules,
            tenants,
            processor,
            quota: QuotaPolicy::default(),
            tenant_concurrency: DEFAULT_TENANT_CONCURRENCY,
        }
    }

    pub fn with_quota(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_tenant_concurrency(mut self, tenant_concurrency: usize) -> Self {
        self.tenant_concurrency = tenant_concurrency.max(1);
        self
    }

    /// Runs one cycle at `now`.
    ///
    /// Only a failing due-report query fails the cycle. Per-item failures are
    /// recorded on the settings row and counted in `errors`.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary, CoreError> {
        let due = self
            .schedules
            .due_reports(now)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to query due reports"))?;
        info!(due = due.len(), %now, "Starting report cycle");

        let mut by_tenant: BTreeMap<Uuid, Vec<DueReport>> = BTreeMap::new();
        for item in due {
            by_tenant.entry(item.tenant_id).or_default().push(item);
        }

        // Selection happens here, before fan-out, so it sees one consistent view.
        let mut summary = CycleSummary::default();
        let mut batches = Vec::with_capacity(by_tenant.len());
        for (tenant_id, items) in by_tenant {
            let tier = self.tier_for(tenant_id).await;
            let limits = self.quota.limits(tier);
            let (selected, skipped) = select_within_allowance(items, limits.max_properties);
            if !skipped.is_empty() {
                info!(
                    %tenant_id,
                    %tier,
                    allowance = limits.max_properties,
                    skipped = skipped.len(),
                    "Tenant over property allowance; skipping newest properties this cycle"
                );
            }
            summary.skipped += skipped.len();
            batches.push((tenant_id, selected));
        }

        let outcomes: Vec<CycleSummary> = stream::iter(batches)
            .map(|(tenant_id, items)| self.run_tenant(tenant_id, items, now))
            .buffer_unordered(self.tenant_concurrency)
            .collect()
            .await;
        for outcome in outcomes {
            summary.processed += outcome.processed;
            summary.errors += outcome.errors;
        }

        info!(
            processed = summary.processed,
            errors = summary.errors,
            skipped = summary.skipped,
            "Report cycle finished"
        );
        Ok(summary)
    }

    async fn tier_for(&self, tenant_id: Uuid) -> SubscriptionTier {
        match self.tenants.tenant_profile(tenant_id).await {
            Ok(Some(profile)) => profile.tier,
            Ok(None) => {
                warn!(%tenant_id, "No profile for tenant; applying free allowance");
                SubscriptionTier::Free
            }
            Err(e) => {
                warn!(%tenant_id, error = %e, "Tier lookup failed; applying free allowance");
                SubscriptionTier::Free
            }
        }
    }

    async fn run_tenant(
        &self,
        tenant_id: Uuid,
        items: Vec<DueReport>,
        now: DateTime<Utc>,
    ) -> CycleSummary {
        let mut outcome = CycleSummary::default();
        for item in &items {
            if self.run_item(item, now).await {
                outcome.processed += 1;
            } else {
                outcome.errors += 1;
            }
        }
        debug!(
            %tenant_id,
            processed = outcome.processed,
            errors = outcome.errors,
            "Tenant batch done"
        );
        outcome
    }

    /// Processes one item and writes its schedule. Returns whether it counts as
    /// processed; a schedule write that fails makes the item an error.
    async fn run_item(&self, item: &DueReport, now: DateTime<Utc>) -> bool {
        let result = self
            .processor
            .process(item.property_id, item.tenant_id, now)
            .await;

        let (update, processed) = match &result {
            Ok(_) => (ScheduleUpdate::success(now, item.frequency_days), true),
            // The report is stored; a bounce does not make the run a failure.
            Err(ProcessingError::Delivery { .. }) => {
                (ScheduleUpdate::success(now, item.frequency_days), true)
            }
            Err(err) => {
                let advance = !err.is_permanent();
                warn!(
                    settings_id = %item.settings_id,
                    property_id = %item.property_id,
                    stage = %err.stage(),
                    permanent = !advance,
                    error = %err,
                    "Report run failed"
                );
                (
                    ScheduleUpdate::failure(now, item.frequency_days, err.to_string(), advance),
                    false,
                )
            }
        };

        match self
            .schedules
            .update_schedule(item.settings_id, item.next_send_at, &update)
            .await
        {
            Ok(true) => processed,
            Ok(false) => {
                warn!(
                    settings_id = %item.settings_id,
                    "Schedule changed by another cycle; keeping the newer value"
                );
                processed
            }
            // The row is still due, so the next cycle runs it again.
            Err(e) => {
                error!(
                    settings_id = %item.settings_id,
                    error = %e,
                    "Failed to update report schedule; counting the run as an error"
                );
                false
            }
        }
    }
}
