//! Minimal health endpoint for load balancers and probes.

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Routes for the health endpoint.
pub fn routes() -> Router {
    Router::new().route("/health", get(health))
}
