//! Background jobs: overdue sweeps, series regeneration, compliance snapshots.
//!
//! Jobs are organization-scoped and typed. Storage failures are retried with
//! exponential backoff; domain failures and exhausted retries are
//! dead-lettered and reported on the outcome stream.

pub mod executor;
pub mod types;

pub use executor::{JobError, JobQueue, JobRunner, JobRunnerConfig, JobRunnerHandle, JobStats};
pub use types::{Job, JobId, JobKind, JobOutcome, JobReport, RetryPolicy};
