use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use careledger_core::{ActorId, AggregateId, DomainError, OrganizationId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLogId(pub AggregateId);

impl AuditLogId {
    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl core::str::FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(DomainError::validation(format!("unknown severity '{other}'"))),
        }
    }
}

/// Structured timeliness outcome recorded alongside an audit entry.
///
/// When present it decides compliance instead of the free-text markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeliness {
    Compliant,
    NonCompliant,
}

impl Timeliness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeliness::Compliant => "compliant",
            Timeliness::NonCompliant => "non_compliant",
        }
    }
}

impl core::str::FromStr for Timeliness {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliant" => Ok(Timeliness::Compliant),
            "non_compliant" => Ok(Timeliness::NonCompliant),
            other => Err(DomainError::validation(format!("unknown timeliness '{other}'"))),
        }
    }
}

/// One timestamped audited action (read-only input to the aggregator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: AuditLogId,
    pub organization_id: OrganizationId,
    pub actor_id: Option<ActorId>,
    pub occurred_at: DateTime<Utc>,
    pub action: String,
    pub details: String,
    pub compliance_category: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub timeliness: Option<Timeliness>,
}
