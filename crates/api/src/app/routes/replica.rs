use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use userlink_core::{Error, UserId};

use crate::app::services::SharedReplicaStore;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/known-users/:id", get(known_user))
}

/// 200 when the replica knows the id, 404 otherwise.
pub async fn known_user(
    Extension(replica): Extension<SharedReplicaStore>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id = match UserId::from_str(&id) {
        Ok(v) => v,
        Err(e) => return errors::error_to_response(e),
    };

    match replica.exists_user_id(user_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(dto::KnownUserResponse {
                user_id,
                known: true,
            }),
        )
            .into_response(),
        Ok(false) => errors::error_to_response(Error::not_found("user", "id", user_id)),
        Err(e) => errors::error_to_response(e.into()),
    }
}
