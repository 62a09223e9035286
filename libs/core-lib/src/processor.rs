//! Single-tenant report processing.
//!
//! One invocation walks `Start → Fetching → Analyzing → Rendering → Persisting
//! → Notifying → Done`. The first failing step stops the run; the only error
//! surfaced after a report is committed is [`ProcessingError::Delivery`].

use crate::{
    CoreError, InsightGenerator, MetricsFetcher, Notifier, PropertyRepository, ReportRepository,
    TenantDirectory, UpstreamError,
    classify::{FailureClass, classify},
    domain::{
        analysis::AnalysisError,
        property::ConnectionStatus,
        report::{NewReport, Report, STATUS_GENERATED},
    },
    render::render_report,
};
use chrono::{DateTime, Utc};
use std::{fmt, sync::Arc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default analytics window handed to the insight generator.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Start,
    Fetching,
    Analyzing,
    Rendering,
    Persisting,
    Notifying,
    Done,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingStage::Start => "start",
            ProcessingStage::Fetching => "fetching",
            ProcessingStage::Analyzing => "analyzing",
            ProcessingStage::Rendering => "rendering",
            ProcessingStage::Persisting => "persisting",
            ProcessingStage::Notifying => "notifying",
            ProcessingStage::Done => "done",
        };
        f.write_str(name)
    }
}

// --- Errors ---

#[derive(thiserror::Error, Debug)]
pub enum ProcessingError {
    #[error("Property not found")]
    PropertyNotFound,
    #[error("No analytics account connected")]
    Credential,
    #[error("Failed to fetch analytics data: {source}")]
    Fetch {
        class: FailureClass,
        #[source]
        source: UpstreamError,
    },
    #[error("Failed to generate analysis: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("Storage error: {0}")]
    Persistence(#[from] CoreError),
    #[error("Report {report_id} saved but delivery failed: {source}")]
    Delivery {
        report_id: Uuid,
        #[source]
        source: UpstreamError,
    },
}

impl ProcessingError {
    /// Permanent failures need the tenant to act (reconnect their account);
    /// retrying on the normal schedule cannot fix them.
    pub fn is_permanent(&self) -> bool {
        match self {
            ProcessingError::Credential => true,
            ProcessingError::Fetch { class, .. } => class.is_credential_revoked(),
            _ => false,
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        match self {
            ProcessingError::PropertyNotFound | ProcessingError::Credential => {
                ProcessingStage::Start
            }
            ProcessingError::Fetch { .. } => ProcessingStage::Fetching,
            ProcessingError::Analysis(_) => ProcessingStage::Analyzing,
            ProcessingError::Persistence(_) => ProcessingStage::Persisting,
            ProcessingError::Delivery { .. } => ProcessingStage::Notifying,
        }
    }
}

// --- Processor ---

/// Everything the processor talks to, injected at construction.
#[derive(Clone)]
pub struct ProcessorPorts {
    pub tenants: Arc<dyn TenantDirectory>,
    pub properties: Arc<dyn PropertyRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub fetcher: Arc<dyn MetricsFetcher>,
    pub generator: Arc<dyn InsightGenerator>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct ReportProcessor {
    ports: ProcessorPorts,
    window_days: u32,
}

impl ReportProcessor {
    pub fn new(ports: ProcessorPorts) -> Self {
        Self {
            ports,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    pub fn with_window_days(mut self, window_days: u32) -> Self {
        self.window_days = window_days;
        self
    }

    /// Generates, stores and delivers one report for `property_id`.
    ///
    /// `tenant_id` is re-checked against the property owner even though the
    /// batch caller is trusted: the store handle bypasses per-request authorization.
    pub async fn process(
        &self,
        property_id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Report, ProcessingError> {
        info!(%property_id, %tenant_id, "Processing report");
        let mut stage = ProcessingStage::Start;

        // 1. Owned lookups
        let property = self
            .ports
            .properties
            .find_owned(property_id, tenant_id)
            .await?
            .ok_or_else(|| {
                warn!(%property_id, %tenant_id, "Property not found for tenant");
                ProcessingError::PropertyNotFound
            })?;
        let profile = self.ports.tenants.tenant_profile(tenant_id).await?;

        // 2. Credential
        let Some((profile, credential)) =
            profile.and_then(|p| p.credential.clone().map(|c| (p, c)))
        else {
            error!(%property_id, %tenant_id, "No analytics credential for tenant");
            self.mark_connection(property_id, ConnectionStatus::Error)
                .await;
            return Err(ProcessingError::Credential);
        };

        // 3. Fetch
        stage = self.advance(stage, ProcessingStage::Fetching, property_id);
        let snapshot = match self
            .ports
            .fetcher
            .fetch(&credential, &property.external_id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(source) => {
                let class = classify(&source);
                error!(%property_id, ?class, error = %source, "Analytics fetch failed");
                if class.is_credential_revoked() {
                    self.mark_connection(property_id, ConnectionStatus::Error)
                        .await;
                }
                return Err(ProcessingError::Fetch { class, source });
            }
        };

        // 4. Analyze
        stage = self.advance(stage, ProcessingStage::Analyzing, property_id);
        let analysis = self
            .ports
            .generator
            .analyze(&snapshot, profile.tier, self.window_days)
            .await
            .inspect_err(|e| error!(%property_id, error = %e, "Analysis failed"))?;

        // 5. Render
        stage = self.advance(stage, ProcessingStage::Rendering, property_id);
        let document = render_report(&analysis);

        // 6. Persist
        stage = self.advance(stage, ProcessingStage::Persisting, property_id);
        let audit = serde_json::json!({
            "metrics": &snapshot,
            "analysis": &analysis,
        });
        let report = self
            .ports
            .reports
            .insert_report(NewReport {
                property_id,
                tenant_id,
                generated_at: now,
                html: Some(document.html.clone()),
                analysis: Some(analysis),
                snapshot: Some(audit),
                status: STATUS_GENERATED.to_string(),
            })
            .await
            .inspect_err(|e| error!(%property_id, error = %e, "Failed to save report"))?;

        // 7. Notify. A bounce never rolls back the stored report.
        stage = self.advance(stage, ProcessingStage::Notifying, property_id);
        let delivery = match profile.delivery_address() {
            Some(address) => self.ports.notifier.send(address, &document).await,
            None => {
                debug!(%tenant_id, "No delivery address; skipping notification");
                Ok(())
            }
        };

        // 8. The fetch worked, so the credential is healthy again.
        self.mark_connection(property_id, ConnectionStatus::Connected)
            .await;

        if let Err(source) = delivery {
            error!(%property_id, report_id = %report.id, error = %source, "Report delivery failed");
            return Err(ProcessingError::Delivery {
                report_id: report.id,
                source,
            });
        }

        self.advance(stage, ProcessingStage::Done, property_id);
        info!(%property_id, report_id = %report.id, "Report generated");
        Ok(report)
    }

    fn advance(
        &self,
        from: ProcessingStage,
        to: ProcessingStage,
        property_id: Uuid,
    ) -> ProcessingStage {
        debug!(%property_id, %from, %to, "Stage transition");
        to
    }

    // Connection health is advisory; a failed write must not mask the run outcome.
    async fn mark_connection(&self, property_id: Uuid, status: ConnectionStatus) {
        if let Err(e) = self
            .ports
            .properties
            .set_connection_status(property_id, status)
            .await
        {
            warn!(
                %property_id,
                status = status.as_str(),
                error = %e,
                "Failed to update connection status"
            );
        }
    }
}
