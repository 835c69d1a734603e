use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use careledger_core::{
    AggregateId, DomainError, DomainResult, OrganizationId, ParticipantId, StaffId,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(pub AggregateId);

impl AppointmentId {
    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for AppointmentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Recurrence cadence of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringPattern {
    Daily,
    Weekly,
    Fortnightly,
    Monthly,
}

impl RecurringPattern {
    /// Parse a pattern name; `None` for anything unrecognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(RecurringPattern::Daily),
            "weekly" => Some(RecurringPattern::Weekly),
            "fortnightly" => Some(RecurringPattern::Fortnightly),
            "monthly" => Some(RecurringPattern::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringPattern::Daily => "daily",
            RecurringPattern::Weekly => "weekly",
            RecurringPattern::Fortnightly => "fortnightly",
            RecurringPattern::Monthly => "monthly",
        }
    }
}

/// Billing metadata copied onto every occurrence of a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingMetadata {
    pub support_item_number: Option<String>,
    pub unit_price: Option<Decimal>,
    pub funding_category: Option<String>,
    pub claim_type: Option<String>,
}

/// Input for booking a single appointment (or the template of a series).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookAppointment {
    pub organization_id: OrganizationId,
    pub participant_id: ParticipantId,
    pub staff_id: StaffId,
    pub title: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub billing: BillingMetadata,
    /// Raw pattern name as supplied; kept verbatim so regeneration sees the same input.
    pub recurring_pattern: Option<String>,
}

/// A scheduled appointment.
///
/// A series template is an appointment with `recurring_pattern` set; generated
/// occurrences point back to it through `series_parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub organization_id: OrganizationId,
    pub participant_id: ParticipantId,
    pub staff_id: StaffId,
    pub title: String,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub billing: BillingMetadata,
    pub recurring_pattern: Option<String>,
    pub series_parent_id: Option<AppointmentId>,
}

/// The appointment a series is derived from.
pub type AppointmentTemplate = Appointment;

impl Appointment {
    pub fn book(cmd: BookAppointment) -> DomainResult<Self> {
        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        if cmd.end_time <= cmd.start_time {
            return Err(DomainError::validation(format!(
                "end_time {} must be after start_time {}",
                cmd.end_time, cmd.start_time
            )));
        }

        Ok(Self {
            id: AppointmentId::generate(),
            organization_id: cmd.organization_id,
            participant_id: cmd.participant_id,
            staff_id: cmd.staff_id,
            title: cmd.title,
            location: cmd.location,
            notes: cmd.notes,
            start_time: cmd.start_time,
            end_time: cmd.end_time,
            billing: cmd.billing,
            recurring_pattern: cmd.recurring_pattern,
            series_parent_id: None,
        })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    pub fn is_series_template(&self) -> bool {
        self.recurring_pattern.is_some() && self.series_parent_id.is_none()
    }

    /// Copy of this template at another time slot, linked back to it.
    pub fn occurrence_at(&self, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: AppointmentId::generate(),
            organization_id: self.organization_id,
            participant_id: self.participant_id,
            staff_id: self.staff_id,
            title: self.title.clone(),
            location: self.location.clone(),
            notes: self.notes.clone(),
            start_time,
            end_time,
            billing: self.billing.clone(),
            recurring_pattern: None,
            series_parent_id: Some(self.id),
        }
    }
}
