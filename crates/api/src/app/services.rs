//! Service wiring: stores, event bus, application services, job runner.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;

use careledger_events::{EventBus, InMemoryEventBus};
use careledger_infra::jobs::{JobOutcome, JobQueue, JobRunner, JobRunnerConfig, JobRunnerHandle};
use careledger_infra::services::{
    ComplianceService, InvoiceEnvelope, InvoiceService, SchedulingService,
};
use careledger_infra::store::{
    AppointmentStore, AuditLogStore, Directory, InMemoryStore, InvoiceStore, PostgresStore,
};

use crate::config::ApiConfig;

/// Notification bus shared by the invoice service and its consumers.
pub type NotificationBus = Arc<InMemoryEventBus<InvoiceEnvelope>>;

/// Which persistence backend the process is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    InMemory,
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::InMemory => "in_memory",
            Backend::Postgres => "postgres",
        }
    }
}

#[derive(Clone)]
pub struct AppServices {
    pub backend: Backend,
    pub invoices: Arc<InvoiceService<NotificationBus>>,
    pub scheduling: Arc<SchedulingService>,
    pub compliance: Arc<ComplianceService>,
    pub jobs: JobQueue,
}

struct Stores {
    invoices: Arc<dyn InvoiceStore>,
    directory: Arc<dyn Directory>,
    appointments: Arc<dyn AppointmentStore>,
    audit_logs: Arc<dyn AuditLogStore>,
}

impl Stores {
    fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: InvoiceStore + Directory + AppointmentStore + AuditLogStore + 'static,
    {
        Self {
            invoices: store.clone(),
            directory: store.clone(),
            appointments: store.clone(),
            audit_logs: store,
        }
    }
}

/// Build services for `config`: Postgres when `DATABASE_URL` is set, in-memory otherwise.
///
/// Must run inside a tokio runtime; the job runner is spawned here.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<(AppServices, JobRunnerHandle)> {
    let (backend, stores) = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to postgres")?;
            store
                .run_migrations()
                .await
                .context("failed to run migrations")?;
            tracing::info!(max_connections = config.db_max_connections, "using postgres stores");
            (Backend::Postgres, Stores::from_backend(Arc::new(store)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            (Backend::InMemory, Stores::from_backend(Arc::new(InMemoryStore::new())))
        }
    };

    Ok(wire(backend, stores, config.invoice_number_max_attempts))
}

/// In-memory wiring over a caller-owned store (tests seed the directory through it).
pub fn build_in_memory(store: Arc<InMemoryStore>) -> (AppServices, JobRunnerHandle) {
    wire(
        Backend::InMemory,
        Stores::from_backend(store),
        ApiConfig::default().invoice_number_max_attempts,
    )
}

fn wire(backend: Backend, stores: Stores, max_number_attempts: u32) -> (AppServices, JobRunnerHandle) {
    let bus: NotificationBus = Arc::new(InMemoryEventBus::new());
    spawn_notification_log(&bus);

    let invoices = Arc::new(
        InvoiceService::new(stores.invoices, stores.directory, bus)
            .with_max_number_attempts(max_number_attempts),
    );
    let scheduling = Arc::new(SchedulingService::new(stores.appointments));
    let compliance = Arc::new(ComplianceService::new(stores.audit_logs));

    let runner = JobRunner::new(invoices.clone(), scheduling.clone(), compliance.clone());
    let (handle, outcomes) = runner.spawn(JobRunnerConfig::default().with_name("api-jobs"));
    tokio::spawn(log_job_outcomes(outcomes));

    let services = AppServices {
        backend,
        invoices,
        scheduling,
        compliance,
        jobs: handle.queue(),
    };
    (services, handle)
}

/// Stand-in notification consumer: logs every lifecycle envelope.
///
/// Runs on a plain thread because bus subscriptions are blocking receivers.
fn spawn_notification_log(bus: &NotificationBus) {
    let subscription = bus.subscribe();
    let spawned = std::thread::Builder::new()
        .name("invoice-notifications".to_string())
        .spawn(move || {
            loop {
                match subscription.recv_timeout(Duration::from_secs(1)) {
                    Ok(envelope) => {
                        tracing::info!(
                            organization_id = %envelope.organization_id(),
                            invoice_id = %envelope.aggregate_id(),
                            event_type = envelope.event_type(),
                            sequence = envelope.sequence_number(),
                            "invoice notification"
                        );
                        match envelope.to_json() {
                            Ok(json) => tracing::debug!(
                                event_id = %json.event_id(),
                                payload = %json.payload(),
                                "invoice notification payload"
                            ),
                            Err(err) => tracing::warn!(
                                error = %err,
                                "invoice notification payload not serializable"
                            ),
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "notification log thread not started");
    }
}

async fn log_job_outcomes(mut outcomes: mpsc::UnboundedReceiver<JobOutcome>) {
    while let Some(outcome) = outcomes.recv().await {
        match &outcome {
            JobOutcome::Completed { job_id, attempts, .. } => {
                tracing::debug!(%job_id, attempts, "job outcome: completed");
            }
            JobOutcome::DeadLettered { job_id, error, .. } => {
                tracing::warn!(%job_id, %error, "job outcome: dead-lettered");
            }
        }
    }
}
