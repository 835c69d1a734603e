//! Postgres-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `StoreError` | Scenario |
//! |------------|---------------|--------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate invoice number / id |
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent SERIALIZABLE writers |
//! | Database (other) | any other | `Backend` | Constraint or other database errors |
//! | Anything else | n/a | `Backend` | Pool closed, network, decode |
//!
//! Financial writes (invoice header + line items) run in one `SERIALIZABLE`
//! transaction; a failure rolls the whole unit back.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use careledger_billing::{InvoiceId, InvoiceLineItem, InvoiceNumber, InvoiceSnapshot};
use careledger_compliance::{AuditLogId, AuditLogRecord, ReportingWindow};
use careledger_core::{
    ActorId, AggregateId, ExpectedVersion, OrganizationId, ParticipantId, StaffId,
};
use careledger_scheduling::{Appointment, AppointmentId, BillingMetadata};

use super::r#trait::{AppointmentStore, AuditLogStore, Directory, InvoiceStore, StoreError};

/// Postgres implementation of every store trait.
///
/// Every query filters on `organization_id`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    #[instrument(skip(self), err)]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    async fn begin_serializable(
        &self,
        operation: &str,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(tx)
    }
}

#[async_trait::async_trait]
impl InvoiceStore for PostgresStore {
    #[instrument(
        skip(self),
        fields(organization_id = %organization_id, sequence = tracing::field::Empty),
        err
    )]
    async fn allocate_sequence(&self, organization_id: OrganizationId) -> Result<u64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_sequences (organization_id, last_value)
            VALUES ($1, 1)
            ON CONFLICT (organization_id)
            DO UPDATE SET last_value = invoice_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("allocate_sequence", e))?;

        Span::current().record("sequence", value);
        u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative sequence {value}")))
    }

    #[instrument(
        skip(self, invoice),
        fields(
            organization_id = %invoice.organization_id,
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            line_count = invoice.line_items.len()
        ),
        err
    )]
    async fn insert(&self, invoice: &InvoiceSnapshot) -> Result<(), StoreError> {
        let mut tx = self.begin_serializable("insert_invoice").await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, organization_id, participant_id, invoice_number,
                invoice_date, due_date, status, subtotal, gst, total,
                notes, payment_method, payment_date, payment_reference,
                sent_date, cancelled_date, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(invoice.id.0.as_uuid())
        .bind(invoice.organization_id.as_uuid())
        .bind(invoice.participant_id.as_uuid())
        .bind(invoice.invoice_number.as_str())
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.status.as_str())
        .bind(invoice.subtotal)
        .bind(invoice.gst)
        .bind(invoice.total)
        .bind(&invoice.notes)
        .bind(&invoice.payment_method)
        .bind(invoice.payment_date)
        .bind(&invoice.payment_reference)
        .bind(invoice.sent_date)
        .bind(invoice.cancelled_date)
        .bind(version_to_db(invoice.version)?)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;

        insert_line_items(&mut tx, invoice.id, &invoice.line_items).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_insert_invoice", e))
    }

    #[instrument(
        skip(self, invoice),
        fields(
            organization_id = %invoice.organization_id,
            invoice_id = %invoice.id,
            status = invoice.status.as_str(),
            expected = ?expected
        ),
        err
    )]
    async fn save(
        &self,
        invoice: &InvoiceSnapshot,
        expected: ExpectedVersion,
        replace_lines: bool,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin_serializable("save_invoice").await?;

        let current: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM invoices WHERE organization_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(invoice.organization_id.as_uuid())
        .bind(invoice.id.0.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_invoice", e))?;

        let Some(current) = current else {
            return Err(StoreError::NotFound(format!("invoice {}", invoice.id)));
        };
        let current = version_from_db(current)?;
        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "invoice {} is at version {current}, expected {expected:?}",
                invoice.id
            )));
        }

        sqlx::query(
            r#"
            UPDATE invoices SET
                invoice_date = $3, due_date = $4, status = $5,
                subtotal = $6, gst = $7, total = $8, notes = $9,
                payment_method = $10, payment_date = $11, payment_reference = $12,
                sent_date = $13, cancelled_date = $14, version = $15, updated_at = $16
            WHERE organization_id = $1 AND id = $2
            "#,
        )
        .bind(invoice.organization_id.as_uuid())
        .bind(invoice.id.0.as_uuid())
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.status.as_str())
        .bind(invoice.subtotal)
        .bind(invoice.gst)
        .bind(invoice.total)
        .bind(&invoice.notes)
        .bind(&invoice.payment_method)
        .bind(invoice.payment_date)
        .bind(&invoice.payment_reference)
        .bind(invoice.sent_date)
        .bind(invoice.cancelled_date)
        .bind(version_to_db(invoice.version)?)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_invoice", e))?;

        if replace_lines {
            sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
                .bind(invoice.id.0.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_line_items", e))?;
            insert_line_items(&mut tx, invoice.id, &invoice.line_items).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_save_invoice", e))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id), err)]
    async fn get(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<Option<InvoiceSnapshot>, StoreError> {
        let header = sqlx::query(
            r#"
            SELECT id, organization_id, participant_id, invoice_number, invoice_date, due_date,
                   status, subtotal, gst, total, notes, payment_method, payment_date,
                   payment_reference, sent_date, cancelled_date, version, created_at, updated_at
            FROM invoices
            WHERE organization_id = $1 AND id = $2
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(invoice_id.0.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_invoice", e))?;

        let Some(header) = header else {
            return Ok(None);
        };

        let lines = sqlx::query(
            r#"
            SELECT line_no, support_item_number, support_item_name, service_date, quantity,
                   unit_price, gst_amount, amount, claim_type, funding_category, staff_member_id
            FROM invoice_line_items
            WHERE invoice_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(invoice_id.0.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_line_items", e))?;

        let line_items = lines
            .iter()
            .map(line_item_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        invoice_from_row(&header, line_items).map(Some)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, as_of = %as_of), err)]
    async fn list_past_due(
        &self,
        organization_id: OrganizationId,
        as_of: NaiveDate,
    ) -> Result<Vec<InvoiceId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM invoices
            WHERE organization_id = $1 AND status = 'sent' AND due_date < $2
            ORDER BY due_date ASC, invoice_number ASC
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_past_due", e))?;

        Ok(ids
            .into_iter()
            .map(|id| InvoiceId::new(AggregateId::from_uuid(id)))
            .collect())
    }
}

#[async_trait::async_trait]
impl AppointmentStore for PostgresStore {
    #[instrument(skip(self, appointment), fields(appointment_id = %appointment.id), err)]
    async fn insert(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let mut builder = appointment_insert_builder(std::slice::from_ref(appointment));
        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_appointment", e))?;
        Ok(())
    }

    #[instrument(skip(self, occurrences), fields(count = occurrences.len()), err)]
    async fn insert_series(&self, occurrences: &[Appointment]) -> Result<(), StoreError> {
        if occurrences.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_insert_series", e))?;
        appointment_insert_builder(occurrences)
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_series", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_insert_series", e))
    }

    #[instrument(
        skip(self, occurrences),
        fields(organization_id = %organization_id, template_id = %template_id, count = occurrences.len()),
        err
    )]
    async fn replace_series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
        occurrences: &[Appointment],
    ) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_replace_series", e))?;

        let removed = sqlx::query(
            "DELETE FROM appointments WHERE organization_id = $1 AND series_parent_id = $2",
        )
        .bind(organization_id.as_uuid())
        .bind(template_id.0.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_series", e))?
        .rows_affected();

        if !occurrences.is_empty() {
            appointment_insert_builder(occurrences)
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_series", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_replace_series", e))?;
        Ok(removed)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, appointment_id = %appointment_id), err)]
    async fn get(
        &self,
        organization_id: OrganizationId,
        appointment_id: AppointmentId,
    ) -> Result<Option<Appointment>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE organization_id = $1 AND id = $2"
        ))
        .bind(organization_id.as_uuid())
        .bind(appointment_id.0.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_appointment", e))?;

        row.as_ref().map(appointment_from_row).transpose()
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, template_id = %template_id), err)]
    async fn list_series(
        &self,
        organization_id: OrganizationId,
        template_id: AppointmentId,
    ) -> Result<Vec<Appointment>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments \
             WHERE organization_id = $1 AND series_parent_id = $2 ORDER BY start_time ASC"
        ))
        .bind(organization_id.as_uuid())
        .bind(template_id.0.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_series", e))?;

        rows.iter().map(appointment_from_row).collect()
    }
}

#[async_trait::async_trait]
impl AuditLogStore for PostgresStore {
    #[instrument(skip(self, record), fields(organization_id = %record.organization_id), err)]
    async fn append(&self, record: &AuditLogRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, organization_id, actor_id, occurred_at, action, details,
                compliance_category, severity, timeliness
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id.0.as_uuid())
        .bind(record.organization_id.as_uuid())
        .bind(record.actor_id.map(|a| *a.as_uuid()))
        .bind(record.occurred_at)
        .bind(&record.action)
        .bind(&record.details)
        .bind(&record.compliance_category)
        .bind(record.severity.as_str())
        .bind(record.timeliness.map(|t| t.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_audit_log", e))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(
            organization_id = %organization_id,
            start = %window.start(),
            end = %window.end(),
            record_count = tracing::field::Empty
        ),
        err
    )]
    async fn list_in_window(
        &self,
        organization_id: OrganizationId,
        window: ReportingWindow,
    ) -> Result<Vec<AuditLogRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, actor_id, occurred_at, action, details,
                   compliance_category, severity, timeliness
            FROM audit_logs
            WHERE organization_id = $1 AND occurred_at >= $2 AND occurred_at <= $3
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_audit_logs", e))?;

        Span::current().record("record_count", rows.len());
        rows.iter().map(audit_log_from_row).collect()
    }
}

#[async_trait::async_trait]
impl Directory for PostgresStore {
    async fn participant_name(
        &self,
        organization_id: OrganizationId,
        participant_id: ParticipantId,
    ) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar(
            "SELECT display_name FROM participants WHERE organization_id = $1 AND id = $2",
        )
        .bind(organization_id.as_uuid())
        .bind(participant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("participant_name", e))
    }

    async fn staff_names(
        &self,
        organization_id: OrganizationId,
        staff_ids: &[StaffId],
    ) -> Result<HashMap<StaffId, String>, StoreError> {
        if staff_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<Uuid> = staff_ids.iter().map(|s| *s.as_uuid()).collect();
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT id, display_name FROM staff_members WHERE organization_id = $1 AND id = ANY($2)",
        )
        .bind(organization_id.as_uuid())
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("staff_names", e))?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| (StaffId::from_uuid(id), name))
            .collect())
    }
}

const APPOINTMENT_COLUMNS: &str = "id, organization_id, participant_id, staff_id, title, location, \
    notes, start_time, end_time, support_item_number, unit_price, funding_category, claim_type, \
    recurring_pattern, series_parent_id";

fn appointment_insert_builder(appointments: &[Appointment]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(format!("INSERT INTO appointments ({APPOINTMENT_COLUMNS}) "));
    builder.push_values(appointments, |mut b, a| {
        b.push_bind(*a.id.0.as_uuid())
            .push_bind(*a.organization_id.as_uuid())
            .push_bind(*a.participant_id.as_uuid())
            .push_bind(*a.staff_id.as_uuid())
            .push_bind(&a.title)
            .push_bind(&a.location)
            .push_bind(&a.notes)
            .push_bind(a.start_time)
            .push_bind(a.end_time)
            .push_bind(&a.billing.support_item_number)
            .push_bind(a.billing.unit_price)
            .push_bind(&a.billing.funding_category)
            .push_bind(&a.billing.claim_type)
            .push_bind(&a.recurring_pattern)
            .push_bind(a.series_parent_id.map(|p| *p.0.as_uuid()));
    });
    builder
}

async fn insert_line_items(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: InvoiceId,
    lines: &[InvoiceLineItem],
) -> Result<(), StoreError> {
    if lines.is_empty() {
        return Ok(());
    }
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO invoice_line_items (invoice_id, line_no, support_item_number, \
         support_item_name, service_date, quantity, unit_price, gst_amount, amount, claim_type, \
         funding_category, staff_member_id) ",
    );
    builder.push_values(lines, |mut b, line| {
        b.push_bind(*invoice_id.0.as_uuid())
            .push_bind(line.line_no as i32)
            .push_bind(&line.support_item_number)
            .push_bind(&line.support_item_name)
            .push_bind(line.service_date)
            .push_bind(line.quantity)
            .push_bind(line.unit_price)
            .push_bind(line.gst_amount)
            .push_bind(line.amount)
            .push_bind(&line.claim_type)
            .push_bind(&line.funding_category)
            .push_bind(line.staff_member_id.map(|s| *s.as_uuid()));
    });
    builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line_items", e))?;
    Ok(())
}

fn invoice_from_row(
    row: &PgRow,
    line_items: Vec<InvoiceLineItem>,
) -> Result<InvoiceSnapshot, StoreError> {
    let status: String = get(row, "status")?;
    let number: String = get(row, "invoice_number")?;
    let version: i64 = get(row, "version")?;

    Ok(InvoiceSnapshot {
        id: InvoiceId::new(AggregateId::from_uuid(get(row, "id")?)),
        invoice_number: number
            .parse::<InvoiceNumber>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        organization_id: OrganizationId::from_uuid(get(row, "organization_id")?),
        participant_id: ParticipantId::from_uuid(get(row, "participant_id")?),
        invoice_date: get(row, "invoice_date")?,
        due_date: get(row, "due_date")?,
        status: status.parse().map_err(|e: careledger_core::DomainError| {
            StoreError::Corrupt(e.to_string())
        })?,
        subtotal: get::<Decimal>(row, "subtotal")?,
        gst: get::<Decimal>(row, "gst")?,
        total: get::<Decimal>(row, "total")?,
        notes: get(row, "notes")?,
        payment_method: get(row, "payment_method")?,
        payment_date: get::<Option<NaiveDate>>(row, "payment_date")?,
        payment_reference: get(row, "payment_reference")?,
        sent_date: get::<Option<DateTime<Utc>>>(row, "sent_date")?,
        cancelled_date: get::<Option<DateTime<Utc>>>(row, "cancelled_date")?,
        line_items,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        version: version_from_db(version)?,
    })
}

fn line_item_from_row(row: &PgRow) -> Result<InvoiceLineItem, StoreError> {
    let line_no: i32 = get(row, "line_no")?;
    Ok(InvoiceLineItem {
        line_no: u32::try_from(line_no)
            .map_err(|_| StoreError::Corrupt(format!("negative line_no {line_no}")))?,
        support_item_number: get(row, "support_item_number")?,
        support_item_name: get(row, "support_item_name")?,
        service_date: get(row, "service_date")?,
        quantity: get(row, "quantity")?,
        unit_price: get(row, "unit_price")?,
        gst_amount: get(row, "gst_amount")?,
        amount: get(row, "amount")?,
        claim_type: get(row, "claim_type")?,
        funding_category: get(row, "funding_category")?,
        staff_member_id: get::<Option<Uuid>>(row, "staff_member_id")?.map(StaffId::from_uuid),
    })
}

fn appointment_from_row(row: &PgRow) -> Result<Appointment, StoreError> {
    Ok(Appointment {
        id: AppointmentId(AggregateId::from_uuid(get(row, "id")?)),
        organization_id: OrganizationId::from_uuid(get(row, "organization_id")?),
        participant_id: ParticipantId::from_uuid(get(row, "participant_id")?),
        staff_id: StaffId::from_uuid(get(row, "staff_id")?),
        title: get(row, "title")?,
        location: get(row, "location")?,
        notes: get(row, "notes")?,
        start_time: get(row, "start_time")?,
        end_time: get(row, "end_time")?,
        billing: BillingMetadata {
            support_item_number: get(row, "support_item_number")?,
            unit_price: get(row, "unit_price")?,
            funding_category: get(row, "funding_category")?,
            claim_type: get(row, "claim_type")?,
        },
        recurring_pattern: get(row, "recurring_pattern")?,
        series_parent_id: get::<Option<Uuid>>(row, "series_parent_id")?
            .map(|id| AppointmentId(AggregateId::from_uuid(id))),
    })
}

fn audit_log_from_row(row: &PgRow) -> Result<AuditLogRecord, StoreError> {
    let severity: String = get(row, "severity")?;
    let timeliness: Option<String> = get(row, "timeliness")?;
    let corrupt = |e: careledger_core::DomainError| StoreError::Corrupt(e.to_string());

    Ok(AuditLogRecord {
        id: AuditLogId(AggregateId::from_uuid(get(row, "id")?)),
        organization_id: OrganizationId::from_uuid(get(row, "organization_id")?),
        actor_id: get::<Option<Uuid>>(row, "actor_id")?.map(ActorId::from_uuid),
        occurred_at: get(row, "occurred_at")?,
        action: get(row, "action")?,
        details: get(row, "details")?,
        compliance_category: get(row, "compliance_category")?,
        severity: severity.parse().map_err(corrupt)?,
        timeliness: timeliness.map(|t| t.parse()).transpose().map_err(corrupt)?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} out of range")))
}

fn version_from_db(version: i64) -> Result<u64, StoreError> {
    u64::try_from(version).map_err(|_| StoreError::Corrupt(format!("negative version {version}")))
}

/// Map SQLx errors to `StoreError` (see the module table).
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
