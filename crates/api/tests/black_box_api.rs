use std::sync::Arc;

use careledger_api::app::{self, services};
use careledger_core::{OrganizationId, ParticipantId, StaffId};
use careledger_infra::store::InMemoryStore;
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory stores, bound to an ephemeral port.
        let store = Arc::new(InMemoryStore::new());
        let (services, _jobs) = services::build_in_memory(store.clone());
        let app = app::build_app(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn line(quantity: &str, unit_price: &str, gst: &str, staff: Option<StaffId>) -> Value {
    json!({
        "support_item_number": "01_011_0107_1_1",
        "support_item_name": "Assistance With Self-Care Activities",
        "service_date": "2025-02-03",
        "quantity": quantity,
        "unit_price": unit_price,
        "gst_amount": gst,
        "claim_type": "standard",
        "funding_category": "core",
        "staff_member_id": staff.map(|s| s.to_string()),
    })
}

fn invoice_body(participant_id: ParticipantId, due_date: &str) -> Value {
    json!({
        "participant_id": participant_id.to_string(),
        "invoice_date": "2025-02-14",
        "due_date": due_date,
        "line_items": [
            line("2", "57.10", "11.42", None),
            line("1", "103.11", "10.31", None),
        ],
    })
}

fn decimal_field(body: &Value, field: &str) -> String {
    body[field].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_needs_no_identity() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["backend"], "in_memory");
}

#[tokio::test]
async fn organization_header_is_required() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/invoices"))
        .json(&invoice_body(ParticipantId::new(), "2025-03-14"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_organization");

    let res = client
        .get(srv.url("/compliance/metrics?start=2025-03-01T00:00:00Z&end=2025-03-31T00:00:00Z"))
        .header("x-organization-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invoice_lifecycle_create_send_pay() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let org = OrganizationId::new().to_string();

    let res = client
        .post(srv.url("/invoices"))
        .header("x-organization-id", &org)
        .json(&invoice_body(ParticipantId::new(), "2025-03-14"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["status"], "draft");
    assert_eq!(decimal_field(&created, "subtotal"), "217.31");
    assert_eq!(decimal_field(&created, "gst"), "21.73");
    assert_eq!(decimal_field(&created, "total"), "239.04");
    assert!(created["invoice_number"].as_str().unwrap().ends_with("-00001"));
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/invoices/{id}/send")))
        .header("x-organization-id", &org)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let payment = json!({ "payment_method": "bank_transfer", "payment_date": "2025-03-01" });
    let res = client
        .post(srv.url(&format!("/invoices/{id}/payment")))
        .header("x-organization-id", &org)
        .json(&payment)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let paid: Value = res.json().await.unwrap();
    assert_eq!(paid["status"], "paid");
    assert_eq!(decimal_field(&paid, "total"), "239.04");

    // Paying again is an illegal transition.
    let res = client
        .post(srv.url(&format!("/invoices/{id}/payment")))
        .header("x-organization-id", &org)
        .json(&payment)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");

    // Financial edits on a paid invoice are rejected too.
    let res = client
        .put(srv.url(&format!("/invoices/{id}")))
        .header("x-organization-id", &org)
        .json(&json!({
            "invoice_date": "2025-02-14",
            "due_date": "2025-03-14",
            "line_items": [line("1", "1.00", "0", None)],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invoices_are_invisible_to_other_organizations() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/invoices"))
        .header("x-organization-id", OrganizationId::new().to_string())
        .json(&invoice_body(ParticipantId::new(), "2025-03-14"))
        .send()
        .await
        .unwrap();
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/invoices/{id}")))
        .header("x-organization-id", OrganizationId::new().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_line_item_is_bad_request() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut body = invoice_body(ParticipantId::new(), "2025-03-14");
    body["line_items"] = json!([line("0", "10.00", "0", None)]);
    let res = client
        .post(srv.url("/invoices"))
        .header("x-organization-id", OrganizationId::new().to_string())
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_line_item");
}

#[tokio::test]
async fn statement_resolves_names() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let org = OrganizationId::new();
    let participant = ParticipantId::new();
    let staff = StaffId::new();
    srv.store.register_participant(org, participant, "Alex Chen").unwrap();
    srv.store.register_staff(org, staff, "Jordan Lee").unwrap();

    let mut body = invoice_body(participant, "2025-03-14");
    body["line_items"] = json!([line("1", "67.56", "0", Some(staff))]);
    let res = client
        .post(srv.url("/invoices"))
        .header("x-organization-id", org.to_string())
        .json(&body)
        .send()
        .await
        .unwrap();
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/invoices/{id}/statement")))
        .header("x-organization-id", org.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let statement: Value = res.json().await.unwrap();
    assert_eq!(statement["participant_name"], "Alex Chen");
    assert_eq!(statement["lines"][0]["staff_name"], "Jordan Lee");
}

#[tokio::test]
async fn weekly_booking_generates_series() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let org = OrganizationId::new().to_string();

    let res = client
        .post(srv.url("/appointments"))
        .header("x-organization-id", &org)
        .json(&json!({
            "participant_id": ParticipantId::new().to_string(),
            "staff_id": StaffId::new().to_string(),
            "title": "Daily living support",
            "start_time": "2025-01-01T10:00:00Z",
            "end_time": "2025-01-01T11:00:00Z",
            "recurring_pattern": "weekly",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let booked: Value = res.json().await.unwrap();
    assert_eq!(booked["series"]["status"], "generated");
    assert_eq!(booked["series"]["count"], 12);
    let id = booked["appointment"]["id"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/appointments/{id}/series")))
        .header("x-organization-id", &org)
        .send()
        .await
        .unwrap();
    let series: Value = res.json().await.unwrap();
    let items = series["items"].as_array().unwrap();
    assert_eq!(items.len(), 12);
    assert_eq!(items[0]["start_time"], "2025-01-08T10:00:00Z");
}

#[tokio::test]
async fn compliance_metrics_from_recorded_audit_logs() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let org = OrganizationId::new().to_string();

    let records = [
        json!({ "occurred_at": "2025-03-02T09:00:00Z", "action": "incident.reported", "details": "fall; reported_within_24_hours", "compliance_category": "incident", "severity": "high" }),
        json!({ "occurred_at": "2025-03-03T09:00:00Z", "action": "incident.reported", "details": "medication error", "compliance_category": "incident", "severity": "critical" }),
        json!({ "occurred_at": "2025-03-04T09:00:00Z", "action": "login", "details": "", "severity": "low" }),
    ];
    for record in &records {
        let res = client
            .post(srv.url("/audit-logs"))
            .header("x-organization-id", &org)
            .json(record)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = client
        .get(srv.url("/compliance/metrics?start=2025-03-01T00:00:00Z&end=2025-03-31T23:59:59Z"))
        .header("x-organization-id", &org)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let metrics: Value = res.json().await.unwrap();
    assert_eq!(metrics["total_records"], 3);
    assert_eq!(metrics["unclassified_records"], 1);
    assert_eq!(metrics["incident"]["count"], 2);
    assert_eq!(metrics["incident"]["compliant_count"], 1);
    assert_eq!(metrics["incident"]["compliance_rate"], "50.00");

    // Inverted window.
    let res = client
        .get(srv.url("/compliance/metrics?start=2025-03-31T00:00:00Z&end=2025-03-01T00:00:00Z"))
        .header("x-organization-id", &org)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overdue_sweep_is_accepted_as_a_job() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let org = OrganizationId::new().to_string();

    let res = client
        .post(srv.url("/invoices"))
        .header("x-organization-id", &org)
        .json(&invoice_body(ParticipantId::new(), "2025-03-01"))
        .send()
        .await
        .unwrap();
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    client
        .post(srv.url(&format!("/invoices/{id}/send")))
        .header("x-organization-id", &org)
        .send()
        .await
        .unwrap();

    let res = client
        .post(srv.url("/jobs/flag-overdue"))
        .header("x-organization-id", &org)
        .json(&json!({ "as_of": "2025-03-15" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: Value = res.json().await.unwrap();
    assert_eq!(accepted["kind"], "billing.flag_overdue");

    // The sweep runs in the background; poll briefly.
    for _ in 0..50 {
        let res = client
            .get(srv.url(&format!("/invoices/{id}")))
            .header("x-organization-id", &org)
            .send()
            .await
            .unwrap();
        let invoice: Value = res.json().await.unwrap();
        if invoice["status"] == "overdue" {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("invoice was not flagged overdue within timeout");
}
