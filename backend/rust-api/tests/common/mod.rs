#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use learnhub_api::{
    config::{Config, QuizSettings},
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::user::{User, UserRole},
    services::AppState,
    store::LmsStore,
};
use mongodb::bson::oid::ObjectId;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub mod failing_store;

pub const PASSWORD: &str = "Str0ngPassw0rd";
pub const JWT_SECRET: &str = "integration-test-secret";

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".to_string(),
        mongo_database: "learnhub_test".to_string(),
        redis_uri: None,
        jwt_secret: JWT_SECRET.to_string(),
        access_token_ttl_seconds: 3600,
        bcrypt_cost: 4,
        bind_addr: "127.0.0.1:0".to_string(),
        registration_open: true,
        quiz: QuizSettings::default(),
    }
}

/// Full router over an in-memory store; `state` gives tests direct store access.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::from_state(AppState::in_memory(config))
    }

    /// Same router over a caller-supplied store.
    pub fn with_store(store: Arc<dyn LmsStore>) -> Self {
        Self::from_state(AppState {
            config: test_config(),
            store,
            redis: None,
        })
    }

    fn from_state(state: AppState) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();

        let state = Arc::new(state);
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).to_string())
            })
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, token, Some(body)).await
    }

    /// Registers an account and returns its access token.
    pub async fn register(&self, email: &str, role: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/auth/register",
                None,
                json!({
                    "email": email,
                    "first_name": "Test",
                    "last_name": "User",
                    "role": role,
                    "password1": PASSWORD,
                    "password2": PASSWORD,
                    "terms_accepted": true,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Inserts an admin directly; admins cannot self-register.
    pub async fn admin_token(&self) -> String {
        let user = User {
            id: ObjectId::new(),
            email: format!("admin-{}@example.com", ObjectId::new().to_hex()),
            password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
            first_name: "Site".to_string(),
            last_name: "Admin".to_string(),
            phone: String::new(),
            birth_date: None,
            role: UserRole::Admin,
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        self.state.store.insert_user(&user).await.unwrap();
        token_for(user.id, UserRole::Admin)
    }

    pub async fn create_course(&self, teacher: &str, title: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/courses",
                Some(teacher),
                json!({
                    "title": title,
                    "description": "A thorough course that walks through every topic step by step.",
                    "level": "beginner",
                    "duration_weeks": 6,
                    "price": 0.0,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create course failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_lesson(
        &self,
        teacher: &str,
        course_id: &str,
        title: &str,
        minutes: u32,
        is_free: bool,
    ) -> String {
        let (status, body) = self
            .post(
                &format!("/api/v1/courses/{}/lessons", course_id),
                Some(teacher),
                json!({
                    "title": title,
                    "duration_minutes": minutes,
                    "is_free": is_free,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create lesson failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn enroll(&self, student: &str, course_id: &str) {
        let (status, body) = self
            .post(&format!("/api/v1/courses/{}/enroll", course_id), Some(student), json!({}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "enroll failed: {}", body);
    }

    /// Progress of the caller's enrollment as shown on the course page.
    pub async fn enrollment_progress(&self, student: &str, course_id: &str) -> (u64, bool) {
        let (status, body) = self
            .get(&format!("/api/v1/courses/{}", course_id), Some(student))
            .await;
        assert_eq!(status, StatusCode::OK, "course detail failed: {}", body);
        let enrollment = &body["enrollment"];
        (
            enrollment["progress"].as_u64().unwrap(),
            enrollment["is_completed"].as_bool().unwrap(),
        )
    }
}

pub fn token_for(user_id: ObjectId, role: UserRole) -> String {
    JwtService::new(JWT_SECRET)
        .generate_token(&JwtClaims::new(user_id, role, 3600))
        .unwrap()
}
