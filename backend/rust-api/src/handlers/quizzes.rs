use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use super::caller_of;
use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{
        quiz::{
            AddQuestionRequest, AttemptResultResponse, CreateQuizRequest, MyResultsQuery,
            MyResultsResponse, QuestionView, QuizDetailResponse, QuizDraftResponse,
            QuizListResponse, QuizStatisticsResponse, QuizSummary, SubmitQuizRequest,
            TakeQuizResponse,
        },
        ApiMessage,
    },
    services::{quiz_service::QuizService, AppState},
};

fn service(state: &AppState) -> QuizService {
    QuizService::new(state.store.clone(), state.config.quiz.clone())
}

/// GET /api/v1/lessons/{id}/quizzes
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(lesson_id): Path<String>,
) -> Result<Json<QuizListResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).list(&caller, &lesson_id).await?))
}

/// POST /api/v1/lessons/{id}/quizzes
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(lesson_id): Path<String>,
    AppJson(req): AppJson<CreateQuizRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_of(&claims)?;
    let quiz: QuizSummary = service(&state).create(&caller, &lesson_id, req).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// GET /api/v1/quizzes/{id}
pub async fn detail(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizDetailResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).detail(&caller, &quiz_id).await?))
}

/// GET /api/v1/quizzes/{id}/take
pub async fn take(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<Json<TakeQuizResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).take(&caller, &quiz_id).await?))
}

/// POST /api/v1/quizzes/{id}/attempts
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<SubmitQuizRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_of(&claims)?;
    let result: AttemptResultResponse = service(&state).submit(&caller, &quiz_id, req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/v1/attempts/{id}
pub async fn result(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptResultResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).result(&caller, &attempt_id).await?))
}

/// POST /api/v1/quizzes/{id}/questions
pub async fn add_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<AddQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_of(&claims)?;
    let question: QuestionView = service(&state).add_question(&caller, &quiz_id, req).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// DELETE /api/v1/questions/{id}
pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(question_id): Path<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).delete_question(&caller, &question_id).await?))
}

/// GET /api/v1/quizzes/{id}/statistics
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizStatisticsResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).statistics(&caller, &quiz_id).await?))
}

/// GET /api/v1/quizzes/results
pub async fn my_results(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<MyResultsQuery>,
) -> Result<Json<MyResultsResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).my_results(&caller, query).await?))
}

/// POST /api/v1/quizzes/{id}/progress - raw body so malformed JSON gets the envelope
pub async fn save_draft(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiMessage>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).save_draft(&caller, &quiz_id, &body).await?))
}

/// GET /api/v1/quizzes/{id}/progress
pub async fn load_draft(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> Result<Json<QuizDraftResponse>, ApiError> {
    let caller = caller_of(&claims)?;
    Ok(Json(service(&state).load_draft(&caller, &quiz_id).await?))
}
