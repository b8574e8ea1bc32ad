//! REST API over the in-memory store.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use charge_settlement::create_api_router;
use charge_settlement::domain::{PaymentMethod, Rate};

use common::{d, harness, Harness};

fn app(h: &Harness) -> Router {
    create_api_router(&h.services, None, None)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    use tower::Service;
    let mut svc = app.into_service();
    let resp = svc.call(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

#[tokio::test]
async fn health_reports_ok_without_database() {
    let h = harness();
    let (status, body) = send(app(&h), get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_caller_header_is_unauthorized() {
    let h = harness();
    let (status, body) = send(app(&h), get("/api/v1/sessions", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn start_stop_and_settle_over_http() {
    let h = harness();
    h.fund("u1", d("100")).await;

    let (status, body) = send(
        app(&h),
        json_request(
            "POST",
            "/api/v1/sessions",
            Some("u1"),
            json!({"charger_id": "CP-1", "station_id": "ST-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "active");
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app(&h),
        json_request(
            "POST",
            "/api/v1/sessions",
            Some("u2"),
            json!({"charger_id": "CP-1", "station_id": "ST-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        app(&h),
        json_request(
            "POST",
            &format!("/api/v1/sessions/{}/stop", session_id),
            Some("u1"),
            json!({"meter": {"energy_kwh": "10"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["session"]["status"], "completed");
    assert_eq!(body["data"]["settlement"]["outcome"], "paid");
    assert_eq!(decimal(&body["data"]["cost"]["total"]), d("10.00"));

    let (status, body) = send(app(&h), get("/api/v1/wallets/u1", Some("u1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["balance"]), d("90.00"));

    let (status, body) = send(
        app(&h),
        get(&format!("/api/v1/sessions/{}/orders", session_id), Some("u1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["status"], "paid");
}

#[tokio::test]
async fn foreign_resources_answer_not_found() {
    let h = harness();
    h.fund("owner", d("10")).await;
    let session = h.start("owner", "CP-1", PaymentMethod::Balance).await;

    let (status, _) = send(
        app(&h),
        get(&format!("/api/v1/sessions/{}", session.session_id), Some("other")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app(&h), get("/api/v1/wallets/owner", Some("other"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gateway_callback_acks_in_plain_text() {
    let h = harness();
    let session = h.start("u3", "CP-3", PaymentMethod::Gateway).await;
    let closed = h
        .services
        .sessions
        .stop(&session.session_id, "u3", common::LOCAL, common::meter("38.4"))
        .await
        .unwrap();
    let order = closed.settlement.order().cloned().unwrap();

    let payload = h.paid_callback(&order.order_id, d("38.40"));
    let form = payload
        .fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let callback = || {
        Request::builder()
            .method("POST")
            .uri("/api/v1/payments/callback")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form.clone()))
            .unwrap()
    };

    for _ in 0..2 {
        let (status, body) = send(app(&h), callback()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("success".into()));
    }

    let garbage = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/callback")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (_, body) = send(app(&h), garbage).await;
    assert_eq!(body, Value::String("fail".into()));

    let order = h.services.orders.get(&order.order_id).await.unwrap();
    assert_eq!(order.status.as_str(), "paid");
}

#[tokio::test]
async fn rates_are_read_only() {
    let h = harness();
    h.services
        .seed_rates(vec![Rate::new("ST-9", d("1.20"), d("0.30"), "CNY").unwrap()])
        .await
        .unwrap();

    let (status, body) = send(app(&h), get("/api/v1/rates/ST-9", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["data"]["electricity_fee_per_kwh"]), d("1.20"));

    // Unknown stations fall back to the default price.
    let (status, body) = send(app(&h), get("/api/v1/rates/ST-404", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["station_id"], "ST-404");
    assert_eq!(decimal(&body["data"]["electricity_fee_per_kwh"]), d("0.60"));

    let (_, body) = send(app(&h), get("/api/v1/rates", None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(
        app(&h),
        json_request(
            "PUT",
            "/api/v1/rates/ST-9",
            None,
            json!({"electricity_fee_per_kwh": "0.01", "service_fee_per_kwh": "0", "currency": "CNY"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let rate = h.services.rates.rate_for("ST-9").await.unwrap();
    assert_eq!(rate.electricity_fee_per_kwh, d("1.20"));
}
