//! Request extractors whose rejections answer with the API error shape.
//!
//! A request without a principal is rejected as 401 before its body, path
//! or query is judged; malformed input from a known principal is a 400.

use crate::error::ApiError;
use crate::principal::principal_from_headers;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{request::Parts, HeaderMap},
    Json,
};
use recordbase_core::ServiceError;
use serde::de::DeserializeOwned;

/// JSON request body.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

/// Typed path segments.
#[derive(Debug)]
pub struct PathParams<T>(pub T);

/// Typed query string.
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

fn reject(headers: &HeaderMap, what: &str, detail: String) -> ApiError {
    if principal_from_headers(headers).is_none() {
        return ApiError::Service(ServiceError::Unauthenticated);
    }
    ApiError::BadRequest(format!("invalid {what}: {detail}"))
}

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(reject(&headers, "request body", rejection.body_text())),
        }
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(reject(&parts.headers, "path", rejection.body_text())),
        }
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(reject(&parts.headers, "query", rejection.body_text())),
        }
    }
}
