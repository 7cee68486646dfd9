use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use std::sync::Arc;

use super::caller_of;
use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::user::{LoginRequest, RegisterRequest, UserProfile},
    services::{account_service::AccountService, auth_service::AuthService, AppState},
};

/// POST /api/v1/auth/register - Register a new user
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Registering new user: {}", req.email);

    let service = AuthService::new(state.store.clone(), &state.config);
    let response = service.register(req).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/login - Login with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AuthService::new(state.store.clone(), &state.config);
    let response = service.login(req).await?;

    Ok(Json(response))
}

/// GET /api/v1/auth/me - Current user
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = caller_of(&claims)?;
    let service = AccountService::new(state.store.clone(), state.config.bcrypt_cost);

    Ok(Json(service.me(&caller).await?))
}
