use anyhow::Context;
use bcrypt::{hash, verify};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use validator::Validate;

use super::{ServiceError, ServiceResult};
use crate::config::Config;
use crate::metrics::{LOGINS_TOTAL, REGISTRATIONS_TOTAL};
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{
    normalize_phone, AuthResponse, LoginRequest, Profile, RegisterRequest, User, UserProfile,
};
use crate::store::{LmsStore, StoreError};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub struct AuthService {
    store: Arc<dyn LmsStore>,
    jwt_service: JwtService,
    access_token_ttl_seconds: i64,
    bcrypt_cost: u32,
    registration_open: bool,
}

impl AuthService {
    pub fn new(store: Arc<dyn LmsStore>, config: &Config) -> Self {
        Self {
            store,
            jwt_service: JwtService::new(&config.jwt_secret),
            access_token_ttl_seconds: config.access_token_ttl_seconds,
            bcrypt_cost: config.bcrypt_cost,
            registration_open: config.registration_open,
        }
    }

    pub fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        hash(password, self.bcrypt_cost).context("Failed to hash password")
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
        verify(password, hash).context("Failed to verify password")
    }

    /// Creates the user and its profile. Nothing is stored when any check
    /// fails, including a duplicate e-mail.
    pub async fn register(&self, req: RegisterRequest) -> ServiceResult<AuthResponse> {
        if !self.registration_open {
            return Err(ServiceError::forbidden("Registration is currently closed"));
        }

        req.validate()?;

        let email = normalize_email(&req.email);
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::field(
                "email",
                "A user with this email already exists",
            ));
        }

        let phone = match req.phone.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => normalize_phone(raw).map_err(|e| {
                ServiceError::field("phone", e.message.unwrap_or_default().to_string())
            })?,
            _ => String::new(),
        };

        let user = User {
            id: ObjectId::new(),
            email,
            password_hash: self.hash_password(&req.password1)?,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            phone,
            birth_date: None,
            role: req.role,
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };

        self.store.insert_user(&user).await.map_err(|e| match e {
            StoreError::Duplicate(_) => {
                ServiceError::field("email", "A user with this email already exists")
            }
            other => other.into(),
        })?;

        if let Err(e) = self.store.insert_profile(&Profile::empty_for(user.id)).await {
            tracing::error!("Profile creation failed for {}, rolling back user: {}", user.id, e);
            self.store.delete_user(user.id).await?;
            return Err(e.into());
        }

        REGISTRATIONS_TOTAL
            .with_label_values(&[user.role.as_str()])
            .inc();
        tracing::info!("User registered: {} ({})", user.id, user.role.as_str());

        self.issue(user)
    }

    pub async fn login(&self, req: LoginRequest) -> ServiceResult<AuthResponse> {
        req.validate()?;

        let email = normalize_email(&req.email);
        let Some(mut user) = self.store.find_user_by_email(&email).await? else {
            LOGINS_TOTAL.with_label_values(&["failed"]).inc();
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !self.verify_password(&req.password, &user.password_hash)? {
            tracing::warn!("Failed login attempt for user {}", user.id);
            LOGINS_TOTAL.with_label_values(&["failed"]).inc();
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if !user.is_active {
            LOGINS_TOTAL.with_label_values(&["inactive"]).inc();
            return Err(ServiceError::forbidden("This account has been deactivated"));
        }

        user.last_login_at = Some(Utc::now());
        self.store.update_user(&user).await?;

        LOGINS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!("User logged in: {}", user.id);

        self.issue(user)
    }

    fn issue(&self, user: User) -> ServiceResult<AuthResponse> {
        let claims = JwtClaims::new(user.id, user.role, self.access_token_ttl_seconds);
        let access_token = self
            .jwt_service
            .generate_token(&claims)
            .map_err(|e| anyhow::anyhow!("Failed to sign access token: {}", e))?;

        Ok(AuthResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.access_token_ttl_seconds,
            user: UserProfile::from(user),
        })
    }
}

/// E-mail addresses are compared trimmed and lowercased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuizSettings;
    use crate::models::user::UserRole;
    use crate::store::MemoryStore;

    fn config() -> Config {
        Config {
            mongo_uri: String::new(),
            mongo_database: String::new(),
            redis_uri: None,
            jwt_secret: "test-secret".to_string(),
            access_token_ttl_seconds: 600,
            bcrypt_cost: 4,
            bind_addr: String::new(),
            registration_open: true,
            quiz: QuizSettings::default(),
        }
    }

    fn registration(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            first_name: "Dilnoza".to_string(),
            last_name: "Rahimova".to_string(),
            phone: Some("998901234567".to_string()),
            role: UserRole::Teacher,
            password1: "password-123".to_string(),
            password2: "password-123".to_string(),
            terms_accepted: true,
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store.clone(), &config());

        let registered = service.register(registration("Dilnoza@Example.com")).await.unwrap();
        assert_eq!(registered.user.email, "dilnoza@example.com");
        assert_eq!(registered.user.phone, "+998901234567");
        assert_eq!(registered.user.role, UserRole::Teacher);

        let user_id = ObjectId::parse_str(&registered.user.id).unwrap();
        assert!(store.find_profile(user_id).await.unwrap().is_some());

        let logged_in = service
            .login(LoginRequest {
                email: "dilnoza@example.com".to_string(),
                password: "password-123".to_string(),
            })
            .await
            .unwrap();
        assert!(logged_in.user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_field_error() {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store.clone(), &config());
        service.register(registration("a@example.com")).await.unwrap();

        let err = service
            .register(registration("A@example.com"))
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation(fields) => assert!(fields.contains_key("email")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store, &config());
        service.register(registration("b@example.com")).await.unwrap();

        let err = service
            .login(LoginRequest {
                email: "b@example.com".to_string(),
                password: "not-the-password".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn closed_registration_is_forbidden() {
        let mut config = config();
        config.registration_open = false;
        let service = AuthService::new(Arc::new(MemoryStore::new()), &config);

        let err = service.register(registration("c@example.com")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
