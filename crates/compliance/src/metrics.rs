//! Compliance metric aggregation over an audit-log window.
//!
//! Pure and deterministic: the same records and window always produce the same
//! metrics, whatever order the records arrive in.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use careledger_core::{DomainError, DomainResult, round_rate};

use crate::audit::{AuditLogRecord, Severity};
use crate::classifier::{ComplianceCategory, classify};

/// Inclusive reporting window `start ≤ occurred_at ≤ end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReportingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if start > end {
            return Err(DomainError::validation(format!(
                "window start {start} is after window end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityBreakdown {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

impl SeverityBreakdown {
    fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub count: u64,
    pub compliant_count: u64,
    /// `compliant_count / count * 100` at 2 dp; `0` for an empty category.
    pub compliance_rate: Decimal,
    pub severity: SeverityBreakdown,
}

impl Default for CategoryMetrics {
    fn default() -> Self {
        Self {
            count: 0,
            compliant_count: 0,
            compliance_rate: round_rate(Decimal::ZERO),
            severity: SeverityBreakdown::default(),
        }
    }
}

impl CategoryMetrics {
    fn finish(&mut self) {
        self.compliance_rate = compliance_rate(self.compliant_count, self.count);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceMetrics {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Every record in the window, classified or not.
    pub total_records: u64,
    pub unclassified_records: u64,
    pub restrictive_practice: CategoryMetrics,
    pub incident: CategoryMetrics,
    pub participant_feedback: CategoryMetrics,
    pub staff_credential: CategoryMetrics,
    /// Weighted score at 2 dp.
    pub score: Decimal,
}

impl ComplianceMetrics {
    pub fn category(&self, category: ComplianceCategory) -> &CategoryMetrics {
        match category {
            ComplianceCategory::RestrictivePractice => &self.restrictive_practice,
            ComplianceCategory::Incident => &self.incident,
            ComplianceCategory::ParticipantFeedback => &self.participant_feedback,
            ComplianceCategory::StaffCredential => &self.staff_credential,
        }
    }

    fn category_mut(&mut self, category: ComplianceCategory) -> &mut CategoryMetrics {
        match category {
            ComplianceCategory::RestrictivePractice => &mut self.restrictive_practice,
            ComplianceCategory::Incident => &mut self.incident,
            ComplianceCategory::ParticipantFeedback => &mut self.participant_feedback,
            ComplianceCategory::StaffCredential => &mut self.staff_credential,
        }
    }
}

/// `compliant / count * 100` rounded half-up to 2 dp; `0` when `count == 0`.
pub fn compliance_rate(compliant: u64, count: u64) -> Decimal {
    round_rate(exact_rate(compliant, count))
}

fn exact_rate(compliant: u64, count: u64) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(compliant) * Decimal::ONE_HUNDRED / Decimal::from(count)
}

/// `0.30·RP + 0.30·INC + 0.20·FB + 0.20·CRED` at 2 dp.
///
/// Weights apply to the unrounded rates; only the score itself is rounded.
pub fn weighted_score(metrics: &ComplianceMetrics) -> Decimal {
    let raw: Decimal = ComplianceCategory::ALL
        .iter()
        .map(|c| {
            let bucket = metrics.category(*c);
            c.weight() * exact_rate(bucket.compliant_count, bucket.count)
        })
        .sum();
    round_rate(raw)
}

/// Aggregate the records that fall inside `window`.
///
/// Records outside the window are ignored, so callers may pass a superset.
pub fn aggregate<'a, I>(window: ReportingWindow, records: I) -> ComplianceMetrics
where
    I: IntoIterator<Item = &'a AuditLogRecord>,
{
    let mut metrics = ComplianceMetrics {
        window_start: window.start(),
        window_end: window.end(),
        total_records: 0,
        unclassified_records: 0,
        restrictive_practice: CategoryMetrics::default(),
        incident: CategoryMetrics::default(),
        participant_feedback: CategoryMetrics::default(),
        staff_credential: CategoryMetrics::default(),
        score: round_rate(Decimal::ZERO),
    };

    for record in records {
        if !window.contains(record.occurred_at) {
            continue;
        }
        metrics.total_records += 1;

        let Some(classification) = classify(record) else {
            metrics.unclassified_records += 1;
            continue;
        };
        let bucket = metrics.category_mut(classification.category);
        bucket.count += 1;
        if classification.compliant {
            bucket.compliant_count += 1;
        }
        bucket.severity.record(record.severity);
    }

    for category in ComplianceCategory::ALL {
        metrics.category_mut(category).finish();
    }
    metrics.score = weighted_score(&metrics);
    metrics
}
