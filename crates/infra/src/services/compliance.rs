use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use careledger_compliance::{AuditLogRecord, ComplianceMetrics, ReportingWindow, aggregate};
use careledger_core::OrganizationId;

use super::ServiceError;
use crate::store::AuditLogStore;

pub struct ComplianceService {
    store: Arc<dyn AuditLogStore>,
}

impl ComplianceService {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, record), fields(organization_id = %record.organization_id, action = %record.action), err)]
    pub async fn record(&self, record: AuditLogRecord) -> Result<AuditLogRecord, ServiceError> {
        self.store.append(&record).await?;
        Ok(record)
    }

    /// Classify the organization's audit logs in `[start, end]` and score them.
    #[instrument(skip(self), fields(organization_id = %organization_id, record_count = tracing::field::Empty), err)]
    pub async fn compute_metrics(
        &self,
        organization_id: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ComplianceMetrics, ServiceError> {
        let window = ReportingWindow::new(start, end)?;
        let records = self.store.list_in_window(organization_id, window).await?;
        tracing::Span::current().record("record_count", records.len());

        let metrics = aggregate(window, &records);
        info!(
            total = metrics.total_records,
            unclassified = metrics.unclassified_records,
            score = %metrics.score,
            "compliance metrics computed"
        );
        Ok(metrics)
    }
}
