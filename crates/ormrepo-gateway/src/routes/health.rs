//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use ormrepo_core::model::Member;
use serde::Serialize;

use crate::AppState;

/// Health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when the store cannot be read.
    pub status: String,
    /// Gateway version.
    pub version: String,
    /// Stored member count, absent when degraded.
    pub members: Option<u64>,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let members = state
        .with_session(|session| session.repository::<Member>().count())
        .await
        .ok();

    Json(HealthResponse {
        status: if members.is_some() { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        members,
    })
}
