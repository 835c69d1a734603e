use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use careledger_core::{DomainError, OrganizationId};
use careledger_scheduling::{
    Appointment, AppointmentId, BookAppointment, SeriesOutcome, generate_series,
};

use super::ServiceError;
use crate::store::AppointmentStore;

/// What happened to the series part of a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeriesStatus {
    NotRecurring,
    Generated { count: usize },
    /// The pattern name was not recognised; the template alone was kept.
    NoOccurrencesGenerated { pattern: String },
    /// The template was saved but the occurrences could not be.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingResult {
    pub appointment: Appointment,
    pub series: SeriesStatus,
}

pub struct SchedulingService {
    store: Arc<dyn AppointmentStore>,
}

impl SchedulingService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Book an appointment and, when it carries a pattern, its series.
    ///
    /// The template commits on its own. A failure writing the occurrences is
    /// reported through [`SeriesStatus::Failed`], not as an error; the template
    /// can be re-expanded later with [`SchedulingService::regenerate_series`].
    #[instrument(
        skip(self, cmd),
        fields(
            organization_id = %cmd.organization_id,
            recurring_pattern = cmd.recurring_pattern.as_deref().unwrap_or("none")
        ),
        err
    )]
    pub async fn book(&self, cmd: BookAppointment) -> Result<BookingResult, ServiceError> {
        let appointment = Appointment::book(cmd)?;
        self.store.insert(&appointment).await?;
        info!(appointment_id = %appointment.id, "appointment booked");

        let Some(pattern) = appointment.recurring_pattern.clone() else {
            return Ok(BookingResult {
                appointment,
                series: SeriesStatus::NotRecurring,
            });
        };

        let series = match generate_series(&appointment, &pattern) {
            SeriesOutcome::NoOccurrencesGenerated { pattern } => {
                warn!(appointment_id = %appointment.id, %pattern, "unrecognised recurring pattern; no occurrences generated");
                SeriesStatus::NoOccurrencesGenerated { pattern }
            }
            SeriesOutcome::Generated(occurrences) => {
                match self.store.insert_series(&occurrences).await {
                    Ok(()) => {
                        info!(appointment_id = %appointment.id, count = occurrences.len(), "series generated");
                        SeriesStatus::Generated {
                            count: occurrences.len(),
                        }
                    }
                    Err(err) => {
                        error!(
                            appointment_id = %appointment.id,
                            error = %err,
                            "series insert failed; template kept without occurrences"
                        );
                        SeriesStatus::Failed {
                            reason: err.to_string(),
                        }
                    }
                }
            }
        };

        Ok(BookingResult {
            appointment,
            series,
        })
    }

    /// Drop a template's generated occurrences and derive them again.
    #[instrument(skip(self), fields(organization_id = %organization_id, template_id = %template_id), err)]
    pub async fn regenerate_series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
    ) -> Result<SeriesStatus, ServiceError> {
        let template = self.get(organization_id, template_id).await?;
        let Some(pattern) = template.recurring_pattern.as_deref() else {
            return Err(DomainError::invalid_state("appointment has no recurring pattern").into());
        };
        if !template.is_series_template() {
            return Err(DomainError::invalid_state("appointment is a series occurrence").into());
        }

        match generate_series(&template, pattern) {
            SeriesOutcome::NoOccurrencesGenerated { pattern } => {
                warn!(%pattern, "unrecognised recurring pattern; series left untouched");
                Ok(SeriesStatus::NoOccurrencesGenerated { pattern })
            }
            SeriesOutcome::Generated(occurrences) => {
                let removed = self
                    .store
                    .replace_series(organization_id, template_id, &occurrences)
                    .await?;
                info!(removed, count = occurrences.len(), "series regenerated");
                Ok(SeriesStatus::Generated {
                    count: occurrences.len(),
                })
            }
        }
    }

    pub async fn get(
        &self,
        organization_id: OrganizationId,
        appointment_id: AppointmentId,
    ) -> Result<Appointment, ServiceError> {
        let appointment = self
            .store
            .get(organization_id, appointment_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        Ok(appointment)
    }

    /// Generated occurrences of a template, ordered by start time.
    pub async fn series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
    ) -> Result<Vec<Appointment>, ServiceError> {
        // Resolves NotFound for unknown or foreign templates.
        self.get(organization_id, template_id).await?;
        Ok(self.store.list_series(organization_id, template_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, TimeZone, Utc};

    use careledger_core::{ParticipantId, StaffId};
    use careledger_scheduling::BillingMetadata;

    use crate::store::InMemoryStore;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn booking(org: OrganizationId, pattern: Option<&str>) -> BookAppointment {
        BookAppointment {
            organization_id: org,
            participant_id: ParticipantId::new(),
            staff_id: StaffId::new(),
            title: "Community access".to_string(),
            location: None,
            notes: None,
            start_time: at(2025, 1, 6, 9),
            end_time: at(2025, 1, 6, 11),
            billing: BillingMetadata::default(),
            recurring_pattern: pattern.map(str::to_string),
        }
    }

    fn service() -> (Arc<InMemoryStore>, SchedulingService) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), SchedulingService::new(store))
    }

    #[tokio::test]
    async fn single_booking_has_no_series() {
        let (_store, service) = service();
        let org = OrganizationId::new();

        let result = service.book(booking(org, None)).await.unwrap();
        assert_eq!(result.series, SeriesStatus::NotRecurring);
        assert_eq!(service.get(org, result.appointment.id).await.unwrap(), result.appointment);
    }

    #[tokio::test]
    async fn weekly_booking_generates_twelve_occurrences() {
        let (_store, service) = service();
        let org = OrganizationId::new();

        let result = service.book(booking(org, Some("weekly"))).await.unwrap();
        assert_eq!(result.series, SeriesStatus::Generated { count: 12 });

        let series = service.series(org, result.appointment.id).await.unwrap();
        assert_eq!(series.len(), 12);
        assert_eq!(series[0].start_time, at(2025, 1, 13, 9));
        assert!(series.iter().all(|o| o.series_parent_id == Some(result.appointment.id)));
    }

    #[tokio::test]
    async fn unrecognised_pattern_keeps_template_only() {
        let (_store, service) = service();
        let org = OrganizationId::new();

        let result = service.book(booking(org, Some("biweekly"))).await.unwrap();
        assert_eq!(
            result.series,
            SeriesStatus::NoOccurrencesGenerated {
                pattern: "biweekly".to_string()
            }
        );
        assert!(service.series(org, result.appointment.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn series_failure_is_reported_and_template_kept() {
        let (store, service) = service();
        let org = OrganizationId::new();
        store.fail_series_writes(true);

        let result = service.book(booking(org, Some("daily"))).await.unwrap();
        assert!(matches!(result.series, SeriesStatus::Failed { .. }));
        assert!(service.get(org, result.appointment.id).await.is_ok());
        assert!(service.series(org, result.appointment.id).await.unwrap().is_empty());

        store.fail_series_writes(false);
        let regenerated = service
            .regenerate_series(org, result.appointment.id)
            .await
            .unwrap();
        assert_eq!(regenerated, SeriesStatus::Generated { count: 89 });
    }

    #[tokio::test]
    async fn regenerate_replaces_existing_occurrences() {
        let (_store, service) = service();
        let org = OrganizationId::new();
        let result = service.book(booking(org, Some("fortnightly"))).await.unwrap();
        let before = service.series(org, result.appointment.id).await.unwrap();

        service.regenerate_series(org, result.appointment.id).await.unwrap();
        let after = service.series(org, result.appointment.id).await.unwrap();

        assert_eq!(after.len(), 6);
        assert_eq!(before.len(), after.len());
        assert!(before.iter().all(|b| after.iter().all(|a| a.id != b.id)));
    }

    #[tokio::test]
    async fn regenerate_rejects_non_templates() {
        let (_store, service) = service();
        let org = OrganizationId::new();
        let single = service.book(booking(org, None)).await.unwrap();

        let err = service
            .regenerate_series(org, single.appointment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::InvalidState(_))));

        let err = service
            .regenerate_series(OrganizationId::new(), single.appointment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn invalid_booking_writes_nothing() {
        let (_store, service) = service();
        let org = OrganizationId::new();
        let mut cmd = booking(org, Some("weekly"));
        cmd.end_time = cmd.start_time;

        let err = service.book(cmd).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
    }
}
