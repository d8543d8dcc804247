use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, middleware::Next, response::Response};

use userlink_auth::{AccessGate, AccessTokenValidator};
use userlink_core::Error;

use crate::app::errors;

#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<AccessGate<Arc<dyn AccessTokenValidator>>>,
}

/// Admit the request only with a valid `Authorization: Bearer <token>`.
pub async fn gate_middleware(
    State(state): State<GateState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let header = authorization(req.headers())?;
    state
        .gate
        .check_header(header)
        .map_err(errors::error_to_response)?;

    Ok(next.run(req).await)
}

fn authorization(headers: &HeaderMap) -> Result<Option<&str>, Response> {
    match headers.get(axum::http::header::AUTHORIZATION) {
        None => Ok(None),
        Some(value) => value.to_str().map(Some).map_err(|_| {
            errors::error_to_response(Error::unauthenticated("authorization header is not text"))
        }),
    }
}
