//! Job payloads, retry policy and outcomes.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use careledger_billing::InvoiceId;
use careledger_compliance::ComplianceMetrics;
use careledger_core::OrganizationId;
use careledger_scheduling::AppointmentId;

use crate::services::SeriesStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a job does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Move sent invoices with `due_date < as_of` to overdue.
    FlagOverdueInvoices { as_of: NaiveDate },
    /// Re-derive the occurrences of a series template.
    RegenerateSeries { template_id: AppointmentId },
    /// Compute compliance metrics for a window (dashboard refresh).
    ComplianceSnapshot {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
}

impl JobKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            JobKind::FlagOverdueInvoices { .. } => "billing.flag_overdue",
            JobKind::RegenerateSeries { .. } => "scheduling.regenerate_series",
            JobKind::ComplianceSnapshot { .. } => "compliance.snapshot",
        }
    }
}

/// An organization-scoped unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub organization_id: OrganizationId,
    pub kind: JobKind,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(organization_id: OrganizationId, kind: JobKind) -> Self {
        Self {
            id: JobId::new(),
            organization_id,
            kind,
            enqueued_at: Utc::now(),
        }
    }

    pub fn flag_overdue(organization_id: OrganizationId, as_of: NaiveDate) -> Self {
        Self::new(organization_id, JobKind::FlagOverdueInvoices { as_of })
    }

    pub fn regenerate_series(organization_id: OrganizationId, template_id: AppointmentId) -> Self {
        Self::new(organization_id, JobKind::RegenerateSeries { template_id })
    }

    pub fn compliance_snapshot(
        organization_id: OrganizationId,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self::new(
            organization_id,
            JobKind::ComplianceSnapshot {
                window_start,
                window_end,
            },
        )
    }
}

/// Retry policy for storage failures. Domain failures are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Result payload of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobReport {
    FlaggedOverdue(Vec<InvoiceId>),
    Series(SeriesStatus),
    Metrics(ComplianceMetrics),
}

/// Terminal state of a job, streamed to whoever holds the outcome receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        job_id: JobId,
        organization_id: OrganizationId,
        attempts: u32,
        report: JobReport,
    },
    DeadLettered {
        job_id: JobId,
        organization_id: OrganizationId,
        attempts: u32,
        error: String,
    },
}

impl JobOutcome {
    pub fn job_id(&self) -> JobId {
        match self {
            JobOutcome::Completed { job_id, .. } | JobOutcome::DeadLettered { job_id, .. } => {
                *job_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn kinds_have_stable_names() {
        let org = OrganizationId::new();
        let job = Job::flag_overdue(org, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(job.kind.type_name(), "billing.flag_overdue");
        assert_eq!(job.organization_id, org);
    }
}
