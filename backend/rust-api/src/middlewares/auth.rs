use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::user::{Caller, UserRole};
use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String, // user id (hex ObjectId)
    pub role: UserRole,
    pub exp: usize, // expiration timestamp
    pub iat: usize, // issued at timestamp
}

impl JwtClaims {
    pub fn new(user_id: ObjectId, role: UserRole, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_hex(),
            role,
            exp: (now + ttl_seconds) as usize,
            iat: now as usize,
        }
    }

    pub fn caller(&self) -> Result<Caller, AuthError> {
        let id = ObjectId::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(Caller {
            id,
            role: self.role,
        })
    }
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token expired"),
            AuthError::MissingToken => write!(f, "Missing authorization token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let validation = Validation::default();

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid bearer token; stores the claims in the
/// request extensions for the handlers.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthorized(AuthError::MissingToken.to_string()))?;

    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let claims = jwt_service.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        ApiError::unauthorized(e.to_string())
    })?;

    tracing::debug!("Authenticated user: {} (role: {})", claims.sub, claims.role.as_str());

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Optional auth - allows requests without token, but validates if present
pub async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&headers) {
        let jwt_service = JwtService::new(&state.config.jwt_secret);
        match jwt_service.validate_token(token) {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
            }
            Err(e) => tracing::debug!("Ignoring invalid token on public route: {}", e),
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = JwtService::new("test-secret");
        let user_id = ObjectId::new();
        let claims = JwtClaims::new(user_id, UserRole::Teacher, 3600);

        let token = service.generate_token(&claims).unwrap();
        let validated = service.validate_token(&token).unwrap();

        assert_eq!(validated.sub, claims.sub);
        assert_eq!(validated.role, UserRole::Teacher);
        assert_eq!(
            validated.caller().unwrap(),
            Caller {
                id: user_id,
                role: UserRole::Teacher
            }
        );
    }

    #[test]
    fn test_jwt_rejects_foreign_secret_and_expiry() {
        let claims = JwtClaims::new(ObjectId::new(), UserRole::Student, 3600);
        let token = JwtService::new("one-secret").generate_token(&claims).unwrap();
        assert!(matches!(
            JwtService::new("other-secret").validate_token(&token),
            Err(AuthError::InvalidSignature)
        ));

        let expired = JwtClaims::new(ObjectId::new(), UserRole::Student, -3600);
        let service = JwtService::new("test-secret");
        let token = service.generate_token(&expired).unwrap();
        assert!(matches!(
            service.validate_token(&token),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[test]
    fn test_caller_requires_object_id_subject() {
        let mut claims = JwtClaims::new(ObjectId::new(), UserRole::Admin, 60);
        claims.sub = "user123".to_string();
        assert!(claims.caller().is_err());
    }
}
