use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

use super::caller_of;
use crate::{
    error::ApiError,
    extractors::{AppJson, JsonOrForm, MaybeClaims},
    middlewares::auth::JwtClaims,
    models::{
        lesson::{
            CreateLessonRequest, LessonDetail, LessonDetailResponse, LessonListResponse,
            LessonProgressReply, ReorderLessonsRequest, UpdateLessonRequest,
            UpdateProgressRequest,
        },
        ApiMessage,
    },
    services::{lesson_service::LessonService, AppState},
};

fn service(state: &AppState) -> LessonService {
    LessonService::new(state.store.clone())
}

/// GET /api/v1/courses/{id}/lessons
pub async fn list(
    State(state): State<Arc<AppState>>,
    claims: MaybeClaims,
    Path(course_id): Path<String>,
) -> Result<Json<LessonListResponse>, ApiError> {
    let caller = claims.caller();
    Ok(Json(service(&state).list(caller.as_ref(), &course_id).await?))
}

/// GET /api/v1/courses/{id}/lessons/{lesson_id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    claims: MaybeClaims,
    Path((course_id, lesson_id)): Path<(String, String)>,
) -> Result<Json<LessonDetailResponse>, ApiError> {
    let caller = claims.caller();
    Ok(Json(
        service(&state)
            .detail(caller.as_ref(), &course_id, &lesson_id)
            .await?,
    ))
}

/// POST /api/v1/lessons/{id}/complete
pub async fn mark_complete(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(lesson_id): Path<String>,
) -> Result<Json<LessonProgressReply>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).mark_complete(&caller, &lesson_id).await?))
}

/// POST /api/v1/lessons/{id}/progress - JSON or form `watched_duration`
pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(lesson_id): Path<String>,
    body: Result<JsonOrForm<UpdateProgressRequest>, Response>,
) -> Result<Json<LessonProgressReply>, ApiError> {
    let caller = caller_of(&claims)?;
    // Unreadable bodies still get the envelope
    let Ok(JsonOrForm(req)) = body else {
        return Ok(Json(LessonProgressReply::refused("Invalid data")));
    };
    Ok(Json(
        service(&state)
            .update_progress(&caller, &lesson_id, req)
            .await?,
    ))
}

/// DELETE /api/v1/lessons/{id}/progress
pub async fn reset_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(lesson_id): Path<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).reset_progress(&caller, &lesson_id).await?))
}

/// POST /api/v1/courses/{id}/lessons
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
    AppJson(req): AppJson<CreateLessonRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_of(&claims)?;
    let lesson: LessonDetail = service(&state).create(&caller, &course_id, req).await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

/// PATCH /api/v1/courses/{id}/lessons/{lesson_id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((course_id, lesson_id)): Path<(String, String)>,
    AppJson(req): AppJson<UpdateLessonRequest>,
) -> Result<Json<LessonDetail>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(
        service(&state)
            .update(&caller, &course_id, &lesson_id, req)
            .await?,
    ))
}

/// DELETE /api/v1/courses/{id}/lessons/{lesson_id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((course_id, lesson_id)): Path<(String, String)>,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(
        service(&state)
            .delete(&caller, &course_id, &lesson_id)
            .await?,
    ))
}

/// POST /api/v1/courses/{id}/lessons/reorder
pub async fn reorder(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
    AppJson(req): AppJson<ReorderLessonsRequest>,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).reorder(&caller, &course_id, req).await?))
}
