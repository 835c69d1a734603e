//! Job runner: a tokio task draining an mpsc queue.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use careledger_events::EventBus;

use super::types::{Job, JobId, JobKind, JobOutcome, JobReport, RetryPolicy};
use crate::services::{
    ComplianceService, InvoiceEnvelope, InvoiceService, SchedulingService, ServiceError,
};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job runner is shut down")]
    Closed,

    #[error("job runner task failed: {0}")]
    Join(String),
}

/// Runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_dead_lettered: u64,
    pub retries: u64,
}

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub name: String,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            name: "job-runner".to_string(),
            queue_capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl JobRunnerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Cloneable submission side of a running job runner.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    pub async fn submit(&self, job: Job) -> Result<JobId, JobError> {
        let id = job.id;
        self.sender.send(job).await.map_err(|_| JobError::Closed)?;
        Ok(id)
    }
}

/// Handle to control a running job runner.
#[derive(Debug)]
pub struct JobRunnerHandle {
    queue: JobQueue,
    join: JoinHandle<()>,
    stats: Arc<Mutex<JobStats>>,
}

impl JobRunnerHandle {
    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    pub async fn submit(&self, job: Job) -> Result<JobId, JobError> {
        self.queue.submit(job).await
    }

    pub fn stats(&self) -> JobStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Stop accepting jobs, finish the ones already queued, and return the final stats.
    ///
    /// Clones of [`JobQueue`] keep the runner alive until they are dropped too.
    pub async fn shutdown(self) -> Result<JobStats, JobError> {
        let JobRunnerHandle { queue, join, stats } = self;
        drop(queue);
        join.await.map_err(|e| JobError::Join(e.to_string()))?;
        Ok(stats.lock().map(|s| s.clone()).unwrap_or_default())
    }
}

/// Executes billing, scheduling and compliance jobs against the services.
pub struct JobRunner<B> {
    invoices: Arc<InvoiceService<B>>,
    scheduling: Arc<SchedulingService>,
    compliance: Arc<ComplianceService>,
}

impl<B> JobRunner<B>
where
    B: EventBus<InvoiceEnvelope> + 'static,
{
    pub fn new(
        invoices: Arc<InvoiceService<B>>,
        scheduling: Arc<SchedulingService>,
        compliance: Arc<ComplianceService>,
    ) -> Self {
        Self {
            invoices,
            scheduling,
            compliance,
        }
    }

    /// Spawn the runner on the current tokio runtime.
    ///
    /// Outcomes are streamed on the returned receiver; dropping it is fine.
    pub fn spawn(
        self,
        config: JobRunnerConfig,
    ) -> (JobRunnerHandle, mpsc::UnboundedReceiver<JobOutcome>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(JobStats::default()));

        let span = info_span!("job_runner", runner = %config.name);
        let join = tokio::spawn(
            run_loop(self, config, receiver, outcome_tx, stats.clone()).instrument(span),
        );

        (
            JobRunnerHandle {
                queue: JobQueue { sender },
                join,
                stats,
            },
            outcome_rx,
        )
    }

    /// Execute a single job once, without retries.
    pub async fn execute_one(&self, job: &Job) -> Result<JobReport, ServiceError> {
        match &job.kind {
            JobKind::FlagOverdueInvoices { as_of } => self
                .invoices
                .flag_overdue(job.organization_id, *as_of)
                .await
                .map(JobReport::FlaggedOverdue),
            JobKind::RegenerateSeries { template_id } => self
                .scheduling
                .regenerate_series(job.organization_id, *template_id)
                .await
                .map(JobReport::Series),
            JobKind::ComplianceSnapshot {
                window_start,
                window_end,
            } => self
                .compliance
                .compute_metrics(job.organization_id, *window_start, *window_end)
                .await
                .map(JobReport::Metrics),
        }
    }
}

async fn run_loop<B>(
    runner: JobRunner<B>,
    config: JobRunnerConfig,
    mut receiver: mpsc::Receiver<Job>,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
    stats: Arc<Mutex<JobStats>>,
) where
    B: EventBus<InvoiceEnvelope> + 'static,
{
    info!("job runner started");

    while let Some(job) = receiver.recv().await {
        debug!(job_id = %job.id, kind = job.kind.type_name(), "picked up job");
        let outcome = execute_with_retry(&runner, &config.retry, &job, &stats).await;

        if let Ok(mut s) = stats.lock() {
            s.jobs_processed += 1;
            match outcome {
                JobOutcome::Completed { .. } => s.jobs_succeeded += 1,
                JobOutcome::DeadLettered { .. } => s.jobs_dead_lettered += 1,
            }
        }

        if outcomes.send(outcome).is_err() {
            debug!(job_id = %job.id, "outcome receiver dropped");
        }
    }

    info!("job runner stopped");
}

async fn execute_with_retry<B>(
    runner: &JobRunner<B>,
    policy: &RetryPolicy,
    job: &Job,
    stats: &Mutex<JobStats>,
) -> JobOutcome
where
    B: EventBus<InvoiceEnvelope> + 'static,
{
    let mut attempt = 1;
    loop {
        match runner.execute_one(job).await {
            Ok(report) => {
                info!(job_id = %job.id, kind = job.kind.type_name(), attempt, "job completed");
                return JobOutcome::Completed {
                    job_id: job.id,
                    organization_id: job.organization_id,
                    attempts: attempt,
                    report,
                };
            }
            Err(ServiceError::Store(err)) if policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    job_id = %job.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "job failed on storage; retrying"
                );
                if let Ok(mut s) = stats.lock() {
                    s.retries += 1;
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(job_id = %job.id, kind = job.kind.type_name(), attempt, error = %err, "job dead-lettered");
                return JobOutcome::DeadLettered {
                    job_id: job.id,
                    organization_id: job.organization_id,
                    attempts: attempt,
                    error: err.to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{NaiveDate, TimeZone, Utc};

    use careledger_billing::LineItemDraft;
    use careledger_core::{OrganizationId, ParticipantId};
    use careledger_events::InMemoryEventBus;
    use careledger_scheduling::AppointmentId;

    use crate::jobs::types::Job;
    use crate::services::NewInvoice;
    use crate::store::InMemoryStore;

    type Bus = Arc<InMemoryEventBus<InvoiceEnvelope>>;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn runner(store: &Arc<InMemoryStore>) -> (Arc<InvoiceService<Bus>>, JobRunner<Bus>) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let invoices = Arc::new(InvoiceService::new(store.clone(), store.clone(), bus));
        let runner = JobRunner::new(
            invoices.clone(),
            Arc::new(SchedulingService::new(store.clone())),
            Arc::new(ComplianceService::new(store.clone())),
        );
        (invoices, runner)
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn flag_overdue_job_completes() {
        let store = Arc::new(InMemoryStore::new());
        let (invoices, runner) = runner(&store);
        let org = OrganizationId::new();

        let invoice = invoices
            .create(
                org,
                NewInvoice {
                    participant_id: ParticipantId::new(),
                    invoice_date: date(2025, 2, 1),
                    due_date: date(2025, 2, 15),
                    notes: None,
                    line_items: vec![LineItemDraft {
                        support_item_number: "01_011_0107_1_1".to_string(),
                        support_item_name: "Assistance With Self-Care Activities".to_string(),
                        service_date: date(2025, 2, 1),
                        quantity: "1".parse().unwrap(),
                        unit_price: "67.56".parse().unwrap(),
                        gst_amount: "0".parse().unwrap(),
                        claim_type: "standard".to_string(),
                        funding_category: "core".to_string(),
                        staff_member_id: None,
                    }],
                },
            )
            .await
            .unwrap();
        invoices.send(org, invoice.id).await.unwrap();

        let (handle, mut outcomes) = runner.spawn(JobRunnerConfig::default());
        let job = Job::flag_overdue(org, date(2025, 3, 1));
        let job_id = handle.submit(job).await.unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.job_id(), job_id);
        match outcome {
            JobOutcome::Completed { report, attempts, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(report, JobReport::FlaggedOverdue(vec![invoice.id]));
            }
            other => panic!("expected completion, got {other:?}"),
        }

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.jobs_processed, 1);
        assert_eq!(stats.jobs_succeeded, 1);
    }

    #[tokio::test]
    async fn domain_failures_dead_letter_without_retry() {
        let store = Arc::new(InMemoryStore::new());
        let (_invoices, runner) = runner(&store);
        let org = OrganizationId::new();

        let (handle, mut outcomes) =
            runner.spawn(JobRunnerConfig::default().with_retry(fast_retry()));
        handle
            .submit(Job::regenerate_series(org, AppointmentId::generate()))
            .await
            .unwrap();

        match outcomes.recv().await.unwrap() {
            JobOutcome::DeadLettered { attempts, error, .. } => {
                assert_eq!(attempts, 1);
                assert!(error.contains("not found"));
            }
            other => panic!("expected dead letter, got {other:?}"),
        }

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.jobs_dead_lettered, 1);
        assert_eq!(stats.retries, 0);
    }

    #[tokio::test]
    async fn storage_failures_are_retried_then_dead_lettered() {
        let store = Arc::new(InMemoryStore::new());
        let (_invoices, runner) = runner(&store);
        let org = OrganizationId::new();
        store.fail_series_writes(true);

        let template = SchedulingService::new(store.clone())
            .book(careledger_scheduling::BookAppointment {
                organization_id: org,
                participant_id: ParticipantId::new(),
                staff_id: careledger_core::StaffId::new(),
                title: "Therapy".to_string(),
                location: None,
                notes: None,
                start_time: Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap(),
                billing: Default::default(),
                recurring_pattern: Some("weekly".to_string()),
            })
            .await
            .unwrap();

        let (handle, mut outcomes) =
            runner.spawn(JobRunnerConfig::default().with_retry(fast_retry()));
        handle
            .submit(Job::regenerate_series(org, template.appointment.id))
            .await
            .unwrap();

        match outcomes.recv().await.unwrap() {
            JobOutcome::DeadLettered { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected dead letter, got {other:?}"),
        }
        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn compliance_snapshot_job_reports_metrics() {
        let store = Arc::new(InMemoryStore::new());
        let (_invoices, runner) = runner(&store);
        let org = OrganizationId::new();
        let compliance = ComplianceService::new(store.clone());

        for details in ["reported_within_24_hours", "reported after 3 days"] {
            compliance
                .record(careledger_compliance::AuditLogRecord {
                    id: careledger_compliance::AuditLogId::generate(),
                    organization_id: org,
                    actor_id: None,
                    occurred_at: Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
                    action: "incident_reported".to_string(),
                    details: details.to_string(),
                    compliance_category: Some("incident".to_string()),
                    severity: careledger_compliance::Severity::High,
                    timeliness: None,
                })
                .await
                .unwrap();
        }

        let (handle, mut outcomes) = runner.spawn(JobRunnerConfig::default());
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap();
        handle
            .submit(Job::compliance_snapshot(org, start, end))
            .await
            .unwrap();

        match outcomes.recv().await.unwrap() {
            JobOutcome::Completed {
                report: JobReport::Metrics(metrics),
                ..
            } => {
                assert_eq!(metrics.total_records, 2);
                assert_eq!(metrics.incident.count, 2);
                assert_eq!(metrics.incident.compliant_count, 1);
                assert_eq!(metrics.incident.compliance_rate, rust_decimal::Decimal::new(5000, 2));
            }
            other => panic!("expected metrics report, got {other:?}"),
        }
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs() {
        let store = Arc::new(InMemoryStore::new());
        let (_invoices, runner) = runner(&store);
        let org = OrganizationId::new();
        let (handle, _outcomes) = runner.spawn(JobRunnerConfig::default());

        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap();
        for _ in 0..3 {
            handle
                .submit(Job::compliance_snapshot(org, start, end))
                .await
                .unwrap();
        }

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.jobs_processed, 3);
        assert_eq!(stats.jobs_succeeded, 3);
    }
}
