use crate::server::{error::ServiceError, service::handler::IdService};
use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use tower_http::trace::TraceLayer;

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub remaining_ranges: usize,
    pub next_start: Option<u64>,
}

pub fn router(service: IdService) -> Router {
    Router::new()
        .route("/id", get(next_id))
        .route("/pool", get(pool))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn next_id(State(service): State<IdService>) -> Result<Json<IdResponse>, ServiceError> {
    let id = service.next_id().await?;
    Ok(Json(IdResponse { id }))
}

async fn pool(State(service): State<IdService>) -> Result<Json<PoolResponse>, ServiceError> {
    let remaining = service.remaining().await?;
    Ok(Json(PoolResponse {
        remaining_ranges: remaining.len(),
        next_start: remaining.first().map(|range| range.start()),
    }))
}

async fn health(State(service): State<IdService>) -> (StatusCode, &'static str) {
    if service.is_serving() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    }
}
