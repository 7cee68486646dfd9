use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use super::caller_of;
use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        dashboard::{DashboardResponse, PublicProfileResponse},
        user::{ChangePasswordRequest, ProfileResponse, UpdateProfileRequest},
        ApiMessage,
    },
    services::{account_service::AccountService, AppState},
};

fn service(state: &AppState) -> AccountService {
    AccountService::new(state.store.clone(), state.config.bcrypt_cost)
}

/// GET /api/v1/accounts/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).dashboard(&caller).await?))
}

/// GET /api/v1/accounts/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).profile(&caller).await?))
}

/// PATCH /api/v1/accounts/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).update_profile(&caller, req).await?))
}

/// POST /api/v1/accounts/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    tracing::info!("Password change requested by {}", caller.id);
    Ok(Json(service(&state).change_password(&caller, req).await?))
}

/// POST /api/v1/accounts/deactivate
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).deactivate(&caller).await?))
}

/// GET /api/v1/accounts/users/{id} - public profile
pub async fn public_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<PublicProfileResponse>, ApiError> {
    Ok(Json(service(&state).public_profile(&user_id).await?))
}
