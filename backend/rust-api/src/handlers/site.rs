use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::JsonOrForm,
    models::{
        newsletter::{HomeResponse, SearchQuery, SearchResponse, SubscribeRequest},
        ApiMessage,
    },
    services::{site_service::SiteService, AppState},
};

/// GET /api/v1/home
pub async fn home(State(state): State<Arc<AppState>>) -> Result<Json<HomeResponse>, ApiError> {
    Ok(Json(SiteService::new(state.store.clone()).home().await?))
}

/// GET /api/v1/search?q=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    Ok(Json(SiteService::new(state.store.clone()).search(query).await?))
}

/// POST /api/v1/newsletter/subscribe
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    body: Result<JsonOrForm<SubscribeRequest>, Response>,
) -> Result<Json<ApiMessage>, ApiError> {
    let Ok(JsonOrForm(req)) = body else {
        return Ok(Json(ApiMessage::fail("Invalid data")));
    };
    Ok(Json(SiteService::new(state.store.clone()).subscribe(req).await?))
}
