use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use super::caller_of;
use crate::{
    error::ApiError,
    extractors::{AppJson, MaybeClaims},
    middlewares::auth::JwtClaims,
    models::{
        course::{
            CatalogQuery, CatalogResponse, CourseCard, CourseDetailResponse, CreateCourseRequest,
            EnrollmentView, InstructorCoursesResponse, LevelCoursesResponse, MyCoursesResponse,
            StatusQuery, UpdateCourseRequest,
        },
        ApiMessage, PageQuery,
    },
    services::{course_service::CourseService, AppState},
};

fn service(state: &AppState) -> CourseService {
    CourseService::new(state.store.clone())
}

/// GET /api/v1/courses
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<CatalogResponse>, ApiError> {
    Ok(Json(service(&state).catalog(query).await?))
}

/// GET /api/v1/courses/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    claims: MaybeClaims,
    Path(course_id): Path<String>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let caller = claims.caller();
    Ok(Json(service(&state).detail(caller.as_ref(), &course_id).await?))
}

/// GET /api/v1/courses/level/{level}
pub async fn by_level(
    State(state): State<Arc<AppState>>,
    Path(level): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<LevelCoursesResponse>, ApiError> {
    Ok(Json(service(&state).by_level(&level, query).await?))
}

/// POST /api/v1/courses/{id}/enroll
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_of(&claims)?;
    let enrollment: EnrollmentView = service(&state).enroll(&caller, &course_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// GET /api/v1/courses/mine
pub async fn my_courses(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<MyCoursesResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).my_courses(&caller, query).await?))
}

/// GET /api/v1/courses/teaching
pub async fn instructor_courses(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<InstructorCoursesResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).instructor_courses(&caller, query).await?))
}

/// POST /api/v1/courses
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateCourseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_of(&claims)?;
    let course: CourseCard = service(&state).create(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// PATCH /api/v1/courses/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
    AppJson(req): AppJson<UpdateCourseRequest>,
) -> Result<Json<CourseCard>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).update(&caller, &course_id, req).await?))
}

/// DELETE /api/v1/courses/{id} - soft delete
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).delete(&caller, &course_id).await?))
}

/// POST /api/v1/courses/{id}/toggle-status
pub async fn toggle_status(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseCard>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).toggle_status(&caller, &course_id).await?))
}
