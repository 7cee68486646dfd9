use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
    Form, Json,
};
use std::convert::Infallible;

use crate::error::ApiError;
use crate::middlewares::auth::JwtClaims;
use crate::models::user::Caller;

/// Custom JSON extractor that returns JSON error responses instead of HTML
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let message = format!("Failed to parse JSON request body: {}", rejection);
                tracing::warn!("{}", message);
                Err(ApiError::bad_request(message).into_response())
            }
        }
    }
}

/// Accepts `application/x-www-form-urlencoded` or JSON bodies.
pub struct JsonOrForm<T>(pub T);

impl<T, S> FromRequest<S> for JsonOrForm<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            match Form::<T>::from_request(req, state).await {
                Ok(Form(value)) => Ok(JsonOrForm(value)),
                Err(rejection) => {
                    let message = format!("Failed to parse form body: {}", rejection);
                    tracing::warn!("{}", message);
                    Err(ApiError::bad_request(message).into_response())
                }
            }
        } else {
            let AppJson(value) = AppJson::<T>::from_request(req, state).await?;
            Ok(JsonOrForm(value))
        }
    }
}

/// Claims left by `optional_auth_middleware`, if the request carried a valid token.
pub struct MaybeClaims(pub Option<JwtClaims>);

impl MaybeClaims {
    /// Tokens whose subject is not an ObjectId count as anonymous.
    pub fn caller(&self) -> Option<Caller> {
        self.0.as_ref().and_then(|claims| claims.caller().ok())
    }
}

impl<S> FromRequestParts<S> for MaybeClaims
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeClaims(parts.extensions.get::<JwtClaims>().cloned()))
    }
}
