//! HTTP API application wiring (Axum routers + service wiring).
//!
//! - `services.rs`: infrastructure wiring (stores, broker, auth service)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use userlink_auth::{AccessGate, AccessTokenValidator};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{SharedAuthService, SharedReplicaStore};

/// Router of the auth service (public entrypoint used by the `userlink-auth` binary).
pub fn build_auth_app(auth: SharedAuthService) -> Router {
    let validator: Arc<dyn AccessTokenValidator> = auth.clone();
    let gate_state = middleware::GateState {
        gate: Arc::new(AccessGate::new(validator)),
    };

    // Protected routes: require a valid bearer token.
    let protected = routes::auth::protected_router().layer(
        ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
            gate_state,
            middleware::gate_middleware,
        )),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::auth::router())
        .merge(protected)
        .layer(Extension(auth))
}

/// Router of the replica service: the "known user" check.
pub fn build_replica_app(replica: SharedReplicaStore) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::replica::router())
        .layer(Extension(replica))
}
