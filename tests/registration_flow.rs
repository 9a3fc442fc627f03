mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use carbonyx::api::db_client::{MARKET_PRICES, PRE_REGISTRATIONS};
use carbonyx::error::DbError;
use carbonyx::router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{pending_app, ready_app, FakeDb, ADMIN_TOKEN};

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn registration(phone: &str) -> Value {
    json!({
        "companyName": "Green Energy Co",
        "contactName": "Kim Minsu",
        "phone": phone,
        "email": "minsu@example.com",
    })
}

#[tokio::test]
async fn health_check_responds_ok() {
    let app = pending_app(FakeDb::default());
    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let (status, body) = send(router(app.state.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn valid_registration_is_stored() {
    let app = ready_app(FakeDb::default()).await;
    let (status, body) = send(
        router(app.state.clone()),
        post_json("/api/pre-registrations", registration("010-1234-5678")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "success");
    assert_eq!(body["record"]["company_name"], "Green Energy Co");

    let stored = app.db.rows_in(PRE_REGISTRATIONS);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["phone"], "010-1234-5678");
    assert_eq!(stored[0]["email"], "minsu@example.com");
}

#[tokio::test]
async fn invalid_registration_never_reaches_the_database() {
    let app = ready_app(FakeDb::default()).await;
    let (status, body) = send(
        router(app.state.clone()),
        post_json(
            "/api/pre-registrations",
            json!({"companyName": "G", "contactName": "", "phone": "12", "email": "nope"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["outcome"], "validation_failed");
    assert_eq!(body["messages"].as_array().unwrap().len(), 4);
    assert_eq!(*app.db.inserts.lock().unwrap(), 0);
}

#[tokio::test]
async fn submission_before_client_is_ready_is_rejected() {
    let app = pending_app(FakeDb::default());
    let (status, body) = send(
        router(app.state.clone()),
        post_json("/api/pre-registrations", registration("01012345678")),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["outcome"], "client_not_ready");
    assert_eq!(*app.db.inserts.lock().unwrap(), 0);
}

#[tokio::test]
async fn duplicate_registration_gets_friendly_message() {
    let app = ready_app(FakeDb::failing(DbError::Remote {
        code: "23505".to_string(),
        message: "duplicate key value violates unique constraint".to_string(),
        details: None,
        hint: None,
    }))
    .await;
    let (status, body) = send(
        router(app.state.clone()),
        post_json("/api/pre-registrations", registration("010-1234-5678")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["outcome"], "remote_error");
    assert_eq!(body["code"], "23505");
    assert_eq!(body["error"], "This information is already registered.");
    assert!(body["contact"].as_str().unwrap().contains("1588-0000"));
}

#[tokio::test]
async fn transport_failure_stages_the_record() {
    let app = ready_app(FakeDb::failing(DbError::Transport("connection reset".to_string()))).await;
    let state = app.state.clone();
    let (status, body) = send(
        router(state.clone()),
        post_json("/api/pre-registrations", registration("010-9876-5432")),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["outcome"], "transport_error");
    assert_eq!(body["staged"], true);

    let pending = state.staging.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record.phone, "010-9876-5432");
    assert_eq!(pending[0].status, "pending_upload");

    let (status, body) = send(router(state.clone()), admin(Method::GET, "/api/admin/pending", Some(ADMIN_TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(router(state.clone()), admin(Method::DELETE, "/api/admin/pending", Some(ADMIN_TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);
    assert!(state.staging.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_submissions_from_one_phone_are_rate_limited() {
    let app = ready_app(FakeDb::default()).await;
    let mut last = StatusCode::OK;
    for _ in 0..6 {
        let (status, _) = send(
            router(app.state.clone()),
            post_json("/api/pre-registrations", registration("010-1111-2222")),
        )
        .await;
        last = status;
    }
    assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.db.rows_in(PRE_REGISTRATIONS).len(), 5);
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let app = ready_app(FakeDb::default()).await;

    let (status, _) = send(router(app.state.clone()), admin(Method::GET, "/api/admin/status", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(router(app.state.clone()), admin(Method::GET, "/api/admin/status", Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(router(app.state.clone()), admin(Method::GET, "/api/admin/status", Some(ADMIN_TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initialized"], true);
    assert_eq!(body["gate_state"], "ready");
}

#[tokio::test]
async fn admin_routes_are_closed_without_configured_token() {
    let mut app = pending_app(FakeDb::default());
    let state = std::sync::Arc::get_mut(&mut app.state).unwrap();
    state.settings.admin_token = None;

    let (status, _) = send(
        router(app.state.clone()),
        admin(Method::GET, "/api/admin/status", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_listing_pages_through_registrations() {
    let app = ready_app(FakeDb::default()).await;
    for phone in ["010-1000-0001", "010-1000-0002", "010-1000-0003"] {
        let (status, _) = send(router(app.state.clone()), post_json("/api/pre-registrations", registration(phone))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        router(app.state.clone()),
        admin(Method::GET, "/api/admin/pre-registrations?limit=2", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        router(app.state.clone()),
        admin(Method::GET, "/api/admin/pre-registrations?limit=0", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_listing_before_init_is_unavailable() {
    let app = pending_app(FakeDb::default());
    let (status, _) = send(
        router(app.state.clone()),
        admin(Method::GET, "/api/admin/pre-registrations", Some(ADMIN_TOKEN)),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn market_prices_fall_back_to_defaults() {
    let app = pending_app(FakeDb::default());
    let request = Request::builder().uri("/api/market-prices").body(Body::empty()).unwrap();
    let (status, body) = send(router(app.state.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["from_database"], false);
    assert_eq!(body["avg_price"], 9000);
    assert_eq!(body["recommended_price"], 12500);
}

#[tokio::test]
async fn admin_price_update_becomes_the_active_row() {
    let app = ready_app(FakeDb::default()).await;
    let mut updates = app.state.price_updates.subscribe();

    let mut request = post_json(
        "/api/admin/market-prices",
        json!({"minPrice": 3500, "avgPrice": 9500, "maxPrice": 16000, "recommendedPrice": 13000}),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", ADMIN_TOKEN).parse().unwrap(),
    );
    let (status, body) = send(router(app.state.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["avg_price"], 9500);
    assert_eq!(updates.recv().await.unwrap().avg_price, 9500);

    let active: Vec<Value> = app
        .db
        .rows_in(MARKET_PRICES)
        .into_iter()
        .filter(|row| row["is_active"] == true)
        .collect();
    assert_eq!(active.len(), 1);

    let request = Request::builder().uri("/api/market-prices").body(Body::empty()).unwrap();
    let (_, body) = send(router(app.state.clone()), request).await;
    assert_eq!(body["from_database"], true);
    assert_eq!(body["avg_price"], 9500);
}

#[tokio::test]
async fn calculator_uses_current_prices() {
    let app = pending_app(FakeDb::default());
    let (status, body) = send(
        router(app.state.clone()),
        post_json("/api/calculator", json!({"generationMwh": 1000.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["estimated_revenue"], 4_131_000);
    assert_eq!(body["formatted_revenue"], "₩4,131,000");

    let (status, body) = send(
        router(app.state.clone()),
        post_json("/api/calculator", json!({"generationMwh": -1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn page_visit_returns_a_session_id() {
    let app = pending_app(FakeDb::default());
    let (status, body) = send(
        router(app.state.clone()),
        post_json("/api/page-visits", json!({"pagePath": "/", "referrer": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["session_id"].as_str().unwrap().starts_with("session_"));

    let (_, body) = send(
        router(app.state.clone()),
        post_json("/api/page-visits", json!({"sessionId": "session_1_abc"})),
    )
    .await;
    assert_eq!(body["session_id"], "session_1_abc");
}

#[tokio::test]
async fn countdown_reports_configured_target() {
    let app = pending_app(FakeDb::default());
    let request = Request::builder().uri("/api/countdown").body(Body::empty()).unwrap();
    let (status, body) = send(router(app.state.clone()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target"], "2025-12-31T23:59:59+09:00");
    assert!(body["days"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn reinit_brings_a_pending_client_up() {
    let app = pending_app(FakeDb::default());
    app.config_slot.provide(std::sync::Arc::new(carbonyx::config::RuntimeConfig::new(
        "https://test.supabase.co",
        "anon",
        carbonyx::config::Environment::Development,
    )));
    app.connector_slot.provide(std::sync::Arc::new(common::FakeConnector(app.db.clone())));

    let (status, body) = send(router(app.state.clone()), admin(Method::POST, "/api/admin/reinit", Some(ADMIN_TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ready");
    assert!(app.state.init_gate.is_ready());
}
