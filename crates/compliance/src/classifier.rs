//! Maps an audit record to a compliance category and decides whether it is compliant.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditLogRecord, Timeliness};

/// Marker in `details` meaning the event was reported inside 24 hours.
pub const REPORTED_WITHIN_24_HOURS: &str = "reported_within_24_hours";
/// Marker in `details` meaning feedback was answered inside the required timeframe.
pub const RESPONDED_WITHIN_TIMEFRAME: &str = "responded_within_timeframe";
const CREDENTIAL_EXPIRED: &str = "expired";
const CREDENTIAL_CURRENT: &str = "current";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceCategory {
    RestrictivePractice,
    Incident,
    ParticipantFeedback,
    StaffCredential,
}

impl ComplianceCategory {
    pub const ALL: [ComplianceCategory; 4] = [
        ComplianceCategory::RestrictivePractice,
        ComplianceCategory::Incident,
        ComplianceCategory::ParticipantFeedback,
        ComplianceCategory::StaffCredential,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "restrictive_practice" => Some(ComplianceCategory::RestrictivePractice),
            "incident" => Some(ComplianceCategory::Incident),
            "participant_feedback" => Some(ComplianceCategory::ParticipantFeedback),
            "staff_credential" => Some(ComplianceCategory::StaffCredential),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceCategory::RestrictivePractice => "restrictive_practice",
            ComplianceCategory::Incident => "incident",
            ComplianceCategory::ParticipantFeedback => "participant_feedback",
            ComplianceCategory::StaffCredential => "staff_credential",
        }
    }

    /// Weight of the category's compliance rate in the overall score.
    pub fn weight(&self) -> Decimal {
        match self {
            ComplianceCategory::RestrictivePractice | ComplianceCategory::Incident => {
                Decimal::new(30, 2)
            }
            ComplianceCategory::ParticipantFeedback | ComplianceCategory::StaffCredential => {
                Decimal::new(20, 2)
            }
        }
    }
}

/// Credential state read from free-text details. Expired wins over current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    Current,
    Expired,
    Unknown,
}

impl CredentialState {
    pub fn from_details(details: &str) -> Self {
        if details.contains(CREDENTIAL_EXPIRED) {
            CredentialState::Expired
        } else if details.contains(CREDENTIAL_CURRENT) {
            CredentialState::Current
        } else {
            CredentialState::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ComplianceCategory,
    pub compliant: bool,
}

/// Classify a record; `None` for a missing or unknown category.
pub fn classify(record: &AuditLogRecord) -> Option<Classification> {
    let category = record
        .compliance_category
        .as_deref()
        .and_then(ComplianceCategory::parse)?;

    let compliant = match record.timeliness {
        Some(t) => t == Timeliness::Compliant,
        None => marker_compliant(category, &record.details),
    };

    Some(Classification {
        category,
        compliant,
    })
}

fn marker_compliant(category: ComplianceCategory, details: &str) -> bool {
    match category {
        ComplianceCategory::RestrictivePractice | ComplianceCategory::Incident => {
            details.contains(REPORTED_WITHIN_24_HOURS)
        }
        ComplianceCategory::ParticipantFeedback => details.contains(RESPONDED_WITHIN_TIMEFRAME),
        ComplianceCategory::StaffCredential => {
            CredentialState::from_details(details) == CredentialState::Current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use careledger_core::OrganizationId;

    use crate::audit::{AuditLogId, Severity};

    fn record(category: Option<&str>, details: &str) -> AuditLogRecord {
        AuditLogRecord {
            id: AuditLogId::generate(),
            organization_id: OrganizationId::new(),
            actor_id: None,
            occurred_at: Utc::now(),
            action: "record".to_string(),
            details: details.to_string(),
            compliance_category: category.map(str::to_string),
            severity: Severity::Medium,
            timeliness: None,
        }
    }

    #[test]
    fn incident_needs_24_hour_marker() {
        let ok = classify(&record(Some("incident"), "fall; reported_within_24_hours")).unwrap();
        assert_eq!(ok.category, ComplianceCategory::Incident);
        assert!(ok.compliant);

        let late = classify(&record(Some("incident"), "fall; reported after 3 days")).unwrap();
        assert!(!late.compliant);
    }

    #[test]
    fn feedback_needs_response_marker() {
        let c = classify(&record(
            Some("participant_feedback"),
            "complaint responded_within_timeframe",
        ))
        .unwrap();
        assert!(c.compliant);
    }

    #[test]
    fn credential_expired_beats_current() {
        assert_eq!(
            CredentialState::from_details("first aid current, police check expired"),
            CredentialState::Expired
        );
        assert_eq!(CredentialState::from_details("wwcc current"), CredentialState::Current);
        assert_eq!(CredentialState::from_details("uploaded"), CredentialState::Unknown);

        let c = classify(&record(Some("staff_credential"), "uploaded")).unwrap();
        assert!(!c.compliant);
    }

    #[test]
    fn unknown_or_missing_category_is_unclassified() {
        assert_eq!(classify(&record(Some("billing"), "reported_within_24_hours")), None);
        assert_eq!(classify(&record(None, "reported_within_24_hours")), None);
    }

    #[test]
    fn structured_timeliness_supersedes_markers() {
        let mut r = record(Some("restrictive_practice"), "reported_within_24_hours");
        r.timeliness = Some(Timeliness::NonCompliant);
        assert!(!classify(&r).unwrap().compliant);

        let mut r = record(Some("staff_credential"), "expired");
        r.timeliness = Some(Timeliness::Compliant);
        assert!(classify(&r).unwrap().compliant);
    }

    #[test]
    fn weights_sum_to_one() {
        let sum: Decimal = ComplianceCategory::ALL.iter().map(|c| c.weight()).sum();
        assert_eq!(sum, Decimal::ONE);
    }
}
