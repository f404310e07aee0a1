//! HTTP routes driven through the router without a listener.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use users_auth::auth::{AuthOptions, AuthService, JwtHandler, MemoryStore};
use users_auth::build_app;

async fn app() -> Router {
    let store = Arc::new(MemoryStore::with_default_roles());
    let options = AuthOptions {
        bcrypt_cost: 4,
        ..AuthOptions::default()
    };
    let service = Arc::new(AuthService::new(
        store,
        JwtHandler::new("http-secret".to_string()),
        options,
    ));
    service.ensure_default_admin("root", "rootpass1").await.unwrap();
    build_app(service)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(app: &Router, username: &str, password: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_login_response_shape() {
    let app = app().await;
    let body = login(&app, "root", "rootpass1").await;

    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());
    assert_eq!(body["user"]["username"], "root");
    assert_eq!(body["user"]["role"]["roleSlug"], "admin");
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_bad_login_is_not_found() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "root", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_refresh_and_replay() {
    let app = app().await;
    let session = login(&app, "root", "rootpass1").await;
    let old = session["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({ "refreshToken": old })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["refreshToken"].as_str().unwrap(), old);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({ "refreshToken": old })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_requires_bearer() {
    let app = app().await;

    let (status, _) = send(&app, Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let session = login(&app, "root", "rootpass1").await;
    let token = session["accessToken"].as_str().unwrap();
    let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "root");
}

#[tokio::test]
async fn test_admin_create_user_and_forbidden() {
    let app = app().await;
    let admin = login(&app, "root", "rootpass1").await;
    let admin_token = admin["accessToken"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/admin/users",
        Some(admin_token),
        Some(json!({ "username": "alice", "password": "alicepass", "role": "user" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"]["roleSlug"], "user");
    assert!(body.get("firstName").is_none());

    let alice = login(&app, "alice", "alicepass").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/admin/users",
        alice["accessToken"].as_str(),
        Some(json!({ "username": "bob", "password": "bobpass12", "role": "user" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_then_refresh_fails() {
    let app = app().await;
    let session = login(&app, "root", "rootpass1").await;
    let refresh = session["refreshToken"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/logout",
        None,
        Some(json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_created_user_profile_names() {
    let app = app().await;
    let admin = login(&app, "root", "rootpass1").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/admin/users",
        admin["accessToken"].as_str(),
        Some(json!({
            "username": "grace",
            "password": "gracepass",
            "role": "user",
            "firstName": "Grace",
            "lastName": "Hollis",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["firstName"], "Grace");

    let grace = login(&app, "grace", "gracepass").await;
    let (status, me) = send(
        &app,
        Method::GET,
        "/api/auth/me",
        grace["accessToken"].as_str(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["lastName"], "Hollis");
}
