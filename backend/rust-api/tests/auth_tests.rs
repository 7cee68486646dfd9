use axum::http::StatusCode;
use learnhub_api::store::{MemoryStore, UserFilter};
use serde_json::json;
use std::sync::Arc;

mod common;

use common::{failing_store::FailingStore, test_config, TestApp, PASSWORD};

fn registration(email: &str) -> serde_json::Value {
    json!({
        "email": email,
        "first_name": "Aziza",
        "last_name": "Karimova",
        "phone": "998 90 123 45 67",
        "role": "student",
        "password1": PASSWORD,
        "password2": PASSWORD,
        "terms_accepted": true,
    })
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/v1/auth/register", None, registration("Aziza@Example.com"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["email"], "aziza@example.com");
    assert_eq!(body["user"]["phone"], "+998901234567");

    let (status, body) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": "aziza@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, me) = app.get("/api/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "student");
    assert!(me["last_login_at"].is_string());
}

#[tokio::test]
async fn test_duplicate_email_creates_nothing() {
    let app = TestApp::new();
    app.register("dup@example.com", "student").await;

    let (status, body) = app
        .post("/api/v1/auth/register", None, registration("DUP@example.com"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["email"].is_array());

    let users = app
        .state
        .store
        .count_users(&UserFilter::default())
        .await
        .unwrap();
    assert_eq!(users, 1);

    // The original account keeps its profile.
    let first = app
        .state
        .store
        .find_user_by_email("dup@example.com")
        .await
        .unwrap()
        .expect("first user exists");
    assert!(app.state.store.find_profile(first.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_registration_rolls_back_user_when_profile_fails() {
    let app = TestApp::with_store(Arc::new(FailingStore {
        inner: MemoryStore::new(),
        fail_profile_insert: true,
        duplicate_progress: false,
    }));

    let (status, body) = app
        .post("/api/v1/auth/register", None, registration("rollback@example.com"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.get("access_token").is_none());

    let user = app
        .state
        .store
        .find_user_by_email("rollback@example.com")
        .await
        .unwrap();
    assert!(user.is_none());
    let users = app
        .state
        .store
        .count_users(&UserFilter::default())
        .await
        .unwrap();
    assert_eq!(users, 0);
}

#[tokio::test]
async fn test_register_validation_errors_are_per_field() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/v1/auth/register",
            None,
            json!({
                "email": "not-an-email",
                "first_name": "",
                "last_name": "User",
                "phone": "+7 999 123 45 67",
                "role": "admin",
                "password1": "short",
                "password2": "different",
                "terms_accepted": false,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["errors"].as_object().unwrap();
    for field in ["email", "first_name", "phone", "role", "password1", "password2", "terms_accepted"] {
        assert!(errors.contains_key(field), "missing error for {}", field);
    }
}

#[tokio::test]
async fn test_registration_closed() {
    let mut config = test_config();
    config.registration_open = false;
    let app = TestApp::with_config(config);

    let (status, _) = app
        .post("/api/v1/auth/register", None, registration("closed@example.com"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new();
    let token = app.register("login@example.com", "student").await;

    let (status, body) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": "login@example.com", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    // Without Redis the limiter is skipped, so repeated failures stay 401.
    for _ in 0..12 {
        let (status, _) = app
            .post(
                "/api/v1/auth/login",
                None,
                json!({ "email": "nobody@example.com", "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = app.post("/api/v1/accounts/deactivate", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": "login@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The old token still decodes but the account is gone.
    let (status, _) = app.get("/api/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/v1/accounts/dashboard", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    let (status, _) = app.get("/api/v1/accounts/dashboard", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_edit_and_password_change() {
    let app = TestApp::new();
    let token = app.register("profile@example.com", "teacher").await;

    let (status, profile) = app.get("/api/v1/accounts/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["bio"], "");

    let (status, profile) = app
        .request(
            "PATCH",
            "/api/v1/accounts/profile",
            Some(&token),
            Some(json!({ "first_name": "  Bobur ", "bio": "Rust teacher" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["first_name"], "Bobur");
    assert_eq!(profile["bio"], "Rust teacher");

    let (status, body) = app
        .post(
            "/api/v1/accounts/change-password",
            Some(&token),
            json!({
                "old_password": "not-my-password",
                "new_password1": "AnotherPass123",
                "new_password2": "AnotherPass123",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["old_password"].is_array());

    let (status, _) = app
        .post(
            "/api/v1/accounts/change-password",
            Some(&token),
            json!({
                "old_password": PASSWORD,
                "new_password1": "AnotherPass123",
                "new_password2": "AnotherPass123",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": "profile@example.com", "password": "AnotherPass123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_dispatches_on_role() {
    let app = TestApp::new();
    let student = app.register("dash-student@example.com", "student").await;
    let teacher = app.register("dash-teacher@example.com", "teacher").await;
    let admin = app.admin_token().await;

    let (_, body) = app.get("/api/v1/accounts/dashboard", Some(&student)).await;
    assert_eq!(body["user_role"], "student");
    assert_eq!(body["stats"]["total_courses"], 0);

    let (_, body) = app.get("/api/v1/accounts/dashboard", Some(&teacher)).await;
    assert_eq!(body["user_role"], "teacher");

    let (status, body) = app.get("/api/v1/accounts/dashboard", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_role"], "admin");
    assert_eq!(body["stats"]["total_users"], 3);
    assert_eq!(body["stats"]["total_teachers"], 1);
}
