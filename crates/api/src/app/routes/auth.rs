use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::app::services::SharedAuthService;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

/// Routes that sit behind the access gate.
pub fn protected_router() -> Router {
    Router::new().route("/auth/validate", get(validate))
}

pub async fn register(
    Extension(auth): Extension<SharedAuthService>,
    body: Result<Json<dto::CredentialsRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::rejection_to_response(rejection),
    };

    match auth.register(&body.username, &body.password).await {
        Ok(user_id) => (StatusCode::CREATED, Json(dto::RegisterResponse { user_id })).into_response(),
        Err(e) => errors::error_to_response(e),
    }
}

pub async fn login(
    Extension(auth): Extension<SharedAuthService>,
    body: Result<Json<dto::CredentialsRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::rejection_to_response(rejection),
    };

    match auth.login(&body.username, &body.password).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => errors::error_to_response(e),
    }
}

pub async fn refresh(
    Extension(auth): Extension<SharedAuthService>,
    body: Result<Json<dto::RefreshRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::rejection_to_response(rejection),
    };

    match auth.refresh_token(&body.refresh_token).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => errors::error_to_response(e),
    }
}

/// Reached only when the gate accepted the bearer token.
pub async fn validate() -> axum::response::Response {
    (StatusCode::OK, Json(dto::ValidateResponse { valid: true })).into_response()
}
