//! HTTP surface tests driving the router directly.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::*;
use conciliation_service::models::SALES_INVOICE;
use conciliation_service::startup::{router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(engine: &TestEngine) -> Router {
    router(AppState {
        services: engine.services.clone(),
        accessor: engine.store.clone(),
    })
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn customer_docs() -> Vec<conciliation_service::models::Document> {
    vec![
        sales_invoice("FC-0001", CUSTOMER, "1000.00", date(2024, 3, 1)),
        payment("REC-0001", "Customer", CUSTOMER, "1000.00", date(2024, 3, 5)),
    ]
}

#[tokio::test]
async fn health_reports_ok() {
    let engine = spawn_engine(Vec::new());
    let (status, body) = send(app(&engine), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "conciliation-service");
}

#[tokio::test]
async fn ready_follows_document_store() {
    let engine = spawn_engine(Vec::new());
    let (status, _) = send(app(&engine), get("/ready")).await;
    assert_eq!(status, StatusCode::OK);

    engine.store.set_unavailable(true);
    let (status, body) = send(app(&engine), get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
}

#[tokio::test]
async fn metrics_are_exposed() {
    let engine = spawn_engine(Vec::new());
    let _ = send(app(&engine), get("/health")).await;

    let response = app(&engine).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn create_list_and_dissolve_round_trip() {
    let engine = spawn_engine(customer_docs());

    let (status, created) = send(
        app(&engine),
        post_json(
            "/api/v1/conciliations/customers",
            json!({
                "party": CUSTOMER,
                "company": COMPANY,
                "documents": [
                    {"voucher_no": "FC-0001", "voucher_type": "Factura"},
                    {"voucher_no": "REC-0001", "voucher_type": "Pago"}
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = created["group_id"].as_str().unwrap().to_string();
    assert!(group_id.starts_with("CONC-CUS-"));
    assert_eq!(created["documents"].as_array().unwrap().len(), 2);
    assert_eq!(created["documents"][0]["label"], "invoice");
    assert_eq!(created["documents"][0]["display_label"], "Factura");
    assert_eq!(created["documents"][1]["display_label"], "Pago");

    let (status, groups) = send(
        app(&engine),
        get("/api/v1/conciliations/customers?party=Cliente%20Uno&company=Acme%20SA"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups.as_array().unwrap().len(), 1);
    assert_eq!(groups[0]["group_id"], group_id.as_str());
    assert_eq!(groups[0]["total_amount"], "0.00");

    let (status, dissolved) = send(
        app(&engine),
        delete(&format!("/api/v1/conciliations/customers/{}", group_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dissolved["cleared_count"], 2);
    assert_eq!(dissolved["unsafe_payments"], json!([]));
}

#[tokio::test]
async fn extending_returns_ok() {
    let engine = spawn_engine(vec![
        tagged(
            sales_invoice("FC-0001", CUSTOMER, "1000.00", date(2024, 3, 1)),
            "CONC-CUS-A",
        ),
        payment("REC-0001", "Customer", CUSTOMER, "1000.00", date(2024, 3, 5)),
    ]);

    let (status, body) = send(
        app(&engine),
        post_json(
            "/api/v1/conciliations/customers",
            json!({
                "party": CUSTOMER,
                "company": COMPANY,
                "documents": [{"voucher_no": "REC-0001"}],
                "group_id": "CONC-CUS-A"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group_id"], "CONC-CUS-A");
}

#[tokio::test]
async fn validation_failure_is_unprocessable() {
    let engine = spawn_engine(customer_docs());

    let (status, body) = send(
        app(&engine),
        post_json(
            "/api/v1/conciliations/customers",
            json!({
                "party": CUSTOMER,
                "company": COMPANY,
                "documents": [{"voucher_no": "FC-0001"}]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("at least two"));
}

#[tokio::test]
async fn mismatched_document_is_named_in_error() {
    let mut docs = customer_docs();
    docs.push(sales_invoice("FC-0200", OTHER_CUSTOMER, "5.00", date(2024, 3, 2)));
    let engine = spawn_engine(docs);

    let (status, body) = send(
        app(&engine),
        post_json(
            "/api/v1/conciliations/customers",
            json!({
                "party": CUSTOMER,
                "company": COMPANY,
                "documents": [{"voucher_no": "FC-0001"}, {"voucher_no": "FC-0200"}]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["document"], "FC-0200");
}

#[tokio::test]
async fn unsafe_dissolve_is_conflict_then_forced() {
    let engine = spawn_engine(vec![
        tagged(
            sales_invoice("FC-000A", CUSTOMER, "0.00", date(2024, 3, 1)),
            "CONC-CUS-A",
        ),
        tagged(
            allocated(
                payment("REC-000C", "Customer", CUSTOMER, "0.00", date(2024, 3, 5)),
                vec![allocation(SALES_INVOICE, "FC-000D", "400.00")],
            ),
            "CONC-CUS-A",
        ),
    ]);

    let (status, body) = send(
        app(&engine),
        delete("/api/v1/conciliations/customers/CONC-CUS-A"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["group_id"], "CONC-CUS-A");
    assert_eq!(body["unsafe_payments"][0]["payment"], "REC-000C");
    assert_eq!(
        body["unsafe_payments"][0]["external_allocations"][0]["reference_name"],
        "FC-000D"
    );

    let (status, body) = send(
        app(&engine),
        delete("/api/v1/conciliations/customers/CONC-CUS-A?force=true"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared_count"], 2);
    assert_eq!(body["unsafe_payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_group_is_not_found() {
    let engine = spawn_engine(customer_docs());
    let (status, _) = send(
        app(&engine),
        delete("/api/v1/conciliations/customers/CONC-CUS-NOPE"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_family_is_not_found() {
    let engine = spawn_engine(customer_docs());
    let (status, _) = send(
        app(&engine),
        get("/api/v1/conciliations/employees?party=x&company=y"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let engine = spawn_engine(Vec::new());
    let (status, body) = send(app(&engine), get("/api/v2/nothing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("/api/v2/nothing"));
}

#[tokio::test]
async fn store_failure_is_retryable_bad_gateway() {
    let engine = spawn_engine(customer_docs());
    engine.store.fail_queries_when(|_, _| true);

    let (status, body) = send(
        app(&engine),
        get("/api/v1/conciliations/customers?party=Cliente%20Uno&company=Acme%20SA"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let engine = spawn_engine(Vec::new());
    let response = app(&engine)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn unknown_company_is_unprocessable() {
    let engine = spawn_engine(customer_docs());
    engine.parties.forget_company("Empresa Fantasma");

    let (status, body) = send(
        app(&engine),
        post_json(
            "/api/v1/conciliations/customers",
            json!({
                "party": CUSTOMER,
                "company": "Empresa Fantasma",
                "documents": [{"voucher_no": "FC-0001"}, {"voucher_no": "REC-0001"}]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.get("retryable").is_none());
}
