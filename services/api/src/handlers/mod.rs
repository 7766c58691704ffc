//! Axum Handlers for the REST API
//!
//! Handlers are grouped by concern: `practice` drives sessions and problem
//! selection, `progress` owns the confidence model, and `ai` proxies requests
//! to the completion model. Each handler carries a `utoipa` path attribute for
//! the generated OpenAPI document.

pub mod ai;
pub mod library;
pub mod practice;
pub mod progress;

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Json, Response},
};
use serde::de::DeserializeOwned;
use tracing::error;

use crate::models::ErrorResponse;

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// A dependency (database, completion API, blob store) failed.
    Upstream(anyhow::Error),
    /// The completion model returned content that failed validation.
    InvalidContent(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Upstream(err) => {
                error!("Upstream failure: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::InvalidContent(message) => {
                error!("Invalid model output: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// `Json` whose rejections (bad syntax, wrong types, missing content type)
/// become `400 {error}` responses.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` with the same `400 {error}` rejection as [`ApiJson`].
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Upstream(err.into())
    }
}
