// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-side guard tests for the dashboard pages.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{header as header_matcher, method, path},
    Mock, MockServer, ResponseTemplate,
};

mod common;

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("sb-access-token={token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Mock the user lookup and profile read for `id` with `role`.
async fn mount_viewer(server: &MockServer, token: &str, id: &str, role: &str) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header_matcher("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_json(id)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": id,
            "email": format!("{id}@example.com"),
            "role": role,
            "display_name": "Bob",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    let (app, _) = common::create_test_app(&server.uri());

    let response = app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_dashboard_without_session_redirects_to_login() {
    let server = MockServer::start().await;
    let (app, _) = common::create_test_app(&server.uri());

    let response = app.oneshot(get("/dashboard", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/auth/login?returnUrl=%2Fdashboard");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_nested_page_keeps_return_url() {
    let server = MockServer::start().await;
    let (app, _) = common::create_test_app(&server.uri());

    let response = app
        .oneshot(get("/dashboard/tasks/42", Some("garbage")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "/auth/login?returnUrl=%2Fdashboard%2Ftasks%2F42"
    );
}

#[tokio::test]
async fn test_member_sees_dashboard() {
    let server = MockServer::start().await;
    let token = common::access_token("bob");
    mount_viewer(&server, &token, "bob", "member").await;

    let (app, _) = common::create_test_app(&server.uri());
    let response = app.oneshot(get("/dashboard", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], "bob");
    assert_eq!(body["role"], "member");
    assert_eq!(body["display_name"], "Bob");
}

#[tokio::test]
async fn test_member_redirected_from_admin_page() {
    let server = MockServer::start().await;
    let token = common::access_token("bob");
    mount_viewer(&server, &token, "bob", "member").await;

    let (app, _) = common::create_test_app(&server.uri());
    let response = app
        .oneshot(get("/dashboard/users", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn test_admin_sees_admin_page() {
    let server = MockServer::start().await;
    let token = common::access_token("ada");
    mount_viewer(&server, &token, "ada", "admin").await;

    let (app, _) = common::create_test_app(&server.uri());
    let response = app
        .oneshot(get("/dashboard/settings", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["role"], "admin");
    assert_eq!(body["path"], "/dashboard/settings");
}

#[tokio::test]
async fn test_revoked_session_redirects_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "revoked" })))
        .mount(&server)
        .await;

    let token = common::access_token("ada");
    let (app, _) = common::create_test_app(&server.uri());
    let response = app
        .oneshot(get("/dashboard/users", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "/auth/login?returnUrl=%2Fdashboard%2Fusers"
    );
}

#[tokio::test]
async fn test_profile_outage_denies_admin_page() {
    let server = MockServer::start().await;
    let token = common::access_token("ada");
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_json("ada")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (app, _) = common::create_test_app(&server.uri());
    let response = app
        .oneshot(get("/dashboard/users", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn test_auth_outage_is_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let token = common::access_token("ada");
    let (app, _) = common::create_test_app(&server.uri());
    let response = app
        .oneshot(get("/dashboard/users", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_token_for_other_user_redirects_to_login() {
    let server = MockServer::start().await;
    let token = common::access_token("mallory");
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_json("ada")))
        .mount(&server)
        .await;

    let (app, _) = common::create_test_app(&server.uri());
    let response = app.oneshot(get("/dashboard", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/auth/login?returnUrl=%2Fdashboard");
}
