//! Recurring series generation.
//!
//! A series is derived from its template once, lazily, inside a fixed
//! three-calendar-month horizon. Occurrence `n` is computed from the template
//! anchor (`start + n * step`), never chained from the previous occurrence, so
//! month-end clamping cannot drift (Jan 31 → Feb 28 → Mar 31).

use chrono::{DateTime, Months, TimeDelta, Utc};

use crate::appointment::{Appointment, AppointmentTemplate, RecurringPattern};

/// Length of the generation window, in calendar months from the template start.
pub const SERIES_HORIZON_MONTHS: u32 = 3;

/// Result of deriving a series from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesOutcome {
    /// The pattern was recognised; the vector may still be empty.
    Generated(Vec<Appointment>),
    /// The pattern name was not recognised; nothing was derived.
    NoOccurrencesGenerated { pattern: String },
}

impl SeriesOutcome {
    pub fn occurrences(&self) -> &[Appointment] {
        match self {
            SeriesOutcome::Generated(occurrences) => occurrences,
            SeriesOutcome::NoOccurrencesGenerated { .. } => &[],
        }
    }

    pub fn into_occurrences(self) -> Vec<Appointment> {
        match self {
            SeriesOutcome::Generated(occurrences) => occurrences,
            SeriesOutcome::NoOccurrencesGenerated { .. } => Vec::new(),
        }
    }
}

/// `start + 3 calendar months`, day clamped to the end of the target month.
pub fn series_horizon(start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    start.checked_add_months(Months::new(SERIES_HORIZON_MONTHS))
}

/// Lazy iterator over `(start, end)` slots of a series, excluding the anchor.
#[derive(Debug, Clone)]
pub struct SeriesIter {
    anchor: DateTime<Utc>,
    duration: TimeDelta,
    pattern: RecurringPattern,
    horizon: Option<DateTime<Utc>>,
    n: u32,
}

impl SeriesIter {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, pattern: RecurringPattern) -> Self {
        Self {
            anchor: start,
            duration: end - start,
            pattern,
            horizon: series_horizon(start),
            n: 0,
        }
    }

    fn nth_start(&self, n: u32) -> Option<DateTime<Utc>> {
        let days = |step: i64| {
            TimeDelta::try_days(step * i64::from(n)).and_then(|d| self.anchor.checked_add_signed(d))
        };
        match self.pattern {
            RecurringPattern::Daily => days(1),
            RecurringPattern::Weekly => days(7),
            RecurringPattern::Fortnightly => days(14),
            RecurringPattern::Monthly => self.anchor.checked_add_months(Months::new(n)),
        }
    }
}

impl Iterator for SeriesIter {
    type Item = (DateTime<Utc>, DateTime<Utc>);

    fn next(&mut self) -> Option<Self::Item> {
        let horizon = self.horizon?;
        let n = self.n.checked_add(1)?;
        let start = self.nth_start(n)?;
        if start >= horizon {
            self.horizon = None;
            return None;
        }
        self.n = n;
        let end = start.checked_add_signed(self.duration)?;
        Some((start, end))
    }
}

/// Derive the occurrences of `template` for `pattern`.
///
/// Unrecognised patterns fail open with [`SeriesOutcome::NoOccurrencesGenerated`].
pub fn generate_series(template: &AppointmentTemplate, pattern: &str) -> SeriesOutcome {
    let Some(parsed) = RecurringPattern::parse(pattern) else {
        return SeriesOutcome::NoOccurrencesGenerated {
            pattern: pattern.to_string(),
        };
    };

    let occurrences = SeriesIter::new(template.start_time, template.end_time, parsed)
        .map(|(start, end)| template.occurrence_at(start, end))
        .collect();
    SeriesOutcome::Generated(occurrences)
}
