//! End-to-end tests over the router, with every backend in memory.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use retail_backoffice::{build_router, MemoryState, ServerConfig};
use retail_mail::RecordingMailer;
use retail_store::{BackendKind, IdentityAdmin, NewAccount};

const OWNER_EMAIL: &str = "owner@shop.example.com";
const OWNER_PASSWORD: &str = "Secret123";

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.backend.kind = BackendKind::Memory;
    config.auth.session_secret = "integration-test-secret-0123".into();
    config.server.app_url = "https://shop.example.com".into();
    config.mail.retry_delay_secs = 0;
    config
}

async fn setup() -> (Router, MemoryState, RecordingMailer) {
    let mailer = RecordingMailer::new();
    let memory = MemoryState::build(test_config(), Arc::new(mailer.clone()), true);
    memory
        .identity
        .create_user(
            &NewAccount {
                email: OWNER_EMAIL.into(),
                password: OWNER_PASSWORD.into(),
                metadata: json!({}),
            },
            true,
        )
        .await
        .unwrap();
    (build_router(memory.state.clone()), memory, mailer)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Logs in with a form post and returns the `name=value` cookie pair.
async fn login(app: &Router, email: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("email={}&password={}", email, password)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> axum::response::Response {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(
    app: &Router,
    uri: &str,
    cookie: Option<&str>,
    body: Value,
) -> axum::response::Response {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_backends() {
    let (app, _memory, _mailer) = setup().await;

    let response = get(&app, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["session_store"], "memory");
}

#[tokio::test]
async fn test_api_requires_session() {
    let (app, _memory, _mailer) = setup().await;

    let response = get(&app, "/api/products", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHENTICATED");
    assert_eq!(body["error"], "Please log in to continue.");
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let (app, _memory, _mailer) = setup().await;

    let response = post_json(
        &app,
        "/login",
        None,
        json!({ "email": OWNER_EMAIL, "password": "Wrong1234" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, _memory, _mailer) = setup().await;
    let cookie = login(&app, OWNER_EMAIL, OWNER_PASSWORD).await;

    let response = get(&app, "/api/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], OWNER_EMAIL);

    let response = post_json(&app, "/logout", Some(&cookie), json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/api/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stock_and_sale_flow() {
    let (app, _memory, _mailer) = setup().await;
    let cookie = login(&app, OWNER_EMAIL, OWNER_PASSWORD).await;

    let response = post_json(
        &app,
        "/api/stock/add",
        Some(&cookie),
        json!({
            "is_new": true,
            "product_name": "Mineral Water",
            "category": "Beverages",
            "quantity": 5
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["product_id"], "#1000");
    assert_eq!(body["new_stock"], 5);

    // Overselling is refused before anything is written.
    let response = post_json(
        &app,
        "/api/sale/create",
        Some(&cookie),
        json!({
            "payment_method": "CASH",
            "total_amount": 10,
            "items": [{ "product_id": "#1000", "quantity": 6 }]
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "INSUFFICIENT_STOCK");

    let response = post_json(
        &app,
        "/api/sale/create",
        Some(&cookie),
        json!({
            "payment_method": "CASH",
            "total_amount": 6,
            "items": [{ "product_id": "#1000", "quantity": 3, "unit_price": 2, "subtotal": 6 }]
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["sale"]["sale_id"], "0001");
    let sale_row = body["sale"]["id"].as_i64().unwrap();

    let response = get(&app, "/api/products?search=Mineral", Some(&cookie)).await;
    let body = body_json(response).await;
    assert_eq!(body["products"][0]["current_stock"], 2);

    let response = get(&app, "/api/sale/get?id=0001", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["sale"]["items"][0]["product_name"], "Mineral Water");

    let response = post_json(&app, "/api/sale/delete", Some(&cookie), json!({ "id": sale_row })).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/api/products?search=Mineral", Some(&cookie)).await;
    let body = body_json(response).await;
    assert_eq!(body["products"][0]["current_stock"], 5);
}

#[tokio::test]
async fn test_invitation_accept_flow() {
    let (app, memory, _mailer) = setup().await;
    let cookie = login(&app, OWNER_EMAIL, OWNER_PASSWORD).await;

    let response = post_json(
        &app,
        "/api/employee/add",
        Some(&cookie),
        json!({ "name": "Aina", "email": "aina@shop.example.com", "role": "Sales" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["employee_id"], "S0001");
    assert_eq!(body["email_status"], "queued");

    let employee = memory
        .state
        .backend
        .employees()
        .get_by_email("aina@shop.example.com")
        .await
        .unwrap()
        .unwrap();
    let token = employee.invitation_token.unwrap();

    // The mailed link carries a trailing slash.
    let response = get(&app, &format!("/invitation/accept/{}/", token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["invitation_valid"], true);
    assert_eq!(body["state"], "pending");

    let response = post_json(
        &app,
        &format!("/invitation/submit/{}", token),
        None,
        json!({ "password": "Welcome123", "confirm_password": "Welcome123" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["employee_id"], "S0001");
    assert_eq!(body["email_confirmation_required"], false);

    // The token is spent.
    let response = get(&app, &format!("/invitation/accept/{}", token), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let cookie = login(&app, "aina@shop.example.com", "Welcome123").await;
    let response = get(&app, "/api/me", Some(&cookie)).await;
    let body = body_json(response).await;
    assert_eq!(body["role"], "Sales");
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let (app, _memory, _mailer) = setup().await;
    let cookie = login(&app, OWNER_EMAIL, OWNER_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sale/create")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &cookie)
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION");
}
