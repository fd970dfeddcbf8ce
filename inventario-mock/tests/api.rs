use axum::Router;
use axum::body::Body;
use http::{Method, Request, StatusCode};
use inventario_mock::{AppState, Config, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const API_KEY: &str = "test-key";

fn app() -> Router {
    let config = Config {
        api_key: API_KEY.to_string(),
        ..Config::default()
    };
    router(Arc::new(AppState::new(config)))
}

async fn call(app: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("apikey", API_KEY)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn sign_in(app: &Router, email: &str, password: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/v1/token?grant_type=password",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn test_password_grant_issues_tokens() {
    let app = app();
    let body = sign_in(&app, "admin@inventario.local", "admin123").await;

    assert!(body["access_token"].as_str().unwrap().split('.').count() == 3);
    assert!(!body["refresh_token"].as_str().unwrap().is_empty());
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["user"]["email"], "admin@inventario.local");
}

#[tokio::test]
async fn test_wrong_password_is_invalid_grant() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/v1/token?grant_type=password",
        None,
        Some(json!({ "email": "admin@inventario.local", "password": "nope" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_grant");
}

#[tokio::test]
async fn test_missing_api_key_rejected() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/rest/v1/rpc/get_email_by_username")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "p_username": "admin" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_username_lookup() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/rest/v1/rpc/get_email_by_username",
        None,
        Some(json!({ "p_username": "vendedor" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("vendedor@inventario.local"));

    let (_, unknown) = call(
        &app,
        Method::POST,
        "/rest/v1/rpc/get_email_by_username",
        None,
        Some(json!({ "p_username": "nadie" })),
    )
    .await;
    assert_eq!(unknown, Value::Null);
}

#[tokio::test]
async fn test_profile_read_requires_session_token() {
    let app = app();
    let tokens = sign_in(&app, "admin@inventario.local", "admin123").await;
    let user_id = tokens["user"]["id"].as_str().unwrap();
    let uri = format!("/rest/v1/profiles?id=eq.{}&select=*,role:roles(*)", user_id);

    let (status, _) = call(&app, Method::GET, &uri, Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, rows) = call(&app, Method::GET, &uri, tokens["access_token"].as_str(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows[0]["username"], "admin");
    assert_eq!(rows[0]["role"]["name"], "Administrador");
    assert_eq!(rows[0]["role"]["permissions"], json!({ "all": true }));
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = app();
    let tokens = sign_in(&app, "vendedor@inventario.local", "vendedor123").await;
    let refresh = json!({ "refresh_token": tokens["refresh_token"] });

    let (status, _) = call(&app, Method::POST, "/auth/v1/token?grant_type=refresh_token", None, Some(refresh.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::POST, "/auth/v1/token?grant_type=refresh_token", None, Some(refresh)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_grant");
}

#[tokio::test]
async fn test_seller_cannot_edit_profiles() {
    let app = app();
    let seller = sign_in(&app, "vendedor@inventario.local", "vendedor123").await;
    let uri = format!("/rest/v1/profiles?id=eq.{}", seller["user"]["id"].as_str().unwrap());

    let (status, body) = call(
        &app,
        Method::PATCH,
        &uri,
        seller["access_token"].as_str(),
        Some(json!({ "display_name": "Otro" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_deactivated_user_cannot_sign_in() {
    let app = app();
    let admin = sign_in(&app, "admin@inventario.local", "admin123").await;
    let seller = sign_in(&app, "vendedor@inventario.local", "vendedor123").await;
    let uri = format!("/rest/v1/profiles?id=eq.{}", seller["user"]["id"].as_str().unwrap());

    let (status, rows) = call(&app, Method::PATCH, &uri, admin["access_token"].as_str(), Some(json!({ "active": false }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows[0]["active"], false);

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/v1/token?grant_type=password",
        None,
        Some(json!({ "email": "vendedor@inventario.local", "password": "vendedor123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User is inactive");
}

#[tokio::test]
async fn test_admin_sets_password() {
    let app = app();
    let admin = sign_in(&app, "admin@inventario.local", "admin123").await;
    let seller = sign_in(&app, "vendedor@inventario.local", "vendedor123").await;
    let seller_id = seller["user"]["id"].as_str().unwrap();

    let (status, _) = call(
        &app,
        Method::POST,
        "/rest/v1/rpc/admin_set_password",
        admin["access_token"].as_str(),
        Some(json!({ "p_user_id": seller_id, "p_password": "123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/rest/v1/rpc/admin_set_password",
        admin["access_token"].as_str(),
        Some(json!({ "p_user_id": seller_id, "p_password": "nueva-clave" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    sign_in(&app, "vendedor@inventario.local", "nueva-clave").await;
}

#[tokio::test]
async fn test_unknown_role_rejected() {
    let app = app();
    let admin = sign_in(&app, "admin@inventario.local", "admin123").await;
    let uri = format!("/rest/v1/profiles?id=eq.{}", admin["user"]["id"].as_str().unwrap());

    let (status, body) = call(&app, Method::PATCH, &uri, admin["access_token"].as_str(), Some(json!({ "role_id": "missing" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "foreign_key_violation");
}

#[tokio::test]
async fn test_logout_revokes_refresh_tokens() {
    let app = app();
    let tokens = sign_in(&app, "admin@inventario.local", "admin123").await;

    let (status, _) = call(&app, Method::POST, "/auth/v1/logout", tokens["access_token"].as_str(), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/v1/token?grant_type=refresh_token",
        None,
        Some(json!({ "refresh_token": tokens["refresh_token"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_profile_update_rejected() {
    let app = app();
    let admin = sign_in(&app, "admin@inventario.local", "admin123").await;
    let uri = format!("/rest/v1/profiles?id=eq.{}", admin["user"]["id"].as_str().unwrap());

    let (status, body) = call(&app, Method::PATCH, &uri, admin["access_token"].as_str(), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}
