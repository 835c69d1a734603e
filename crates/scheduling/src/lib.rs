//! `careledger-scheduling`: appointments and recurring series derivation.

pub mod appointment;
pub mod recurrence;

pub use appointment::{
    Appointment, AppointmentId, AppointmentTemplate, BillingMetadata, BookAppointment,
    RecurringPattern,
};
pub use recurrence::{
    SERIES_HORIZON_MONTHS, SeriesIter, SeriesOutcome, generate_series, series_horizon,
};
