//! Operational HTTP endpoints.
//!
//! - `GET /health`: liveness, always `ok`
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /notifications/stats`: today's notification counters as JSON

pub mod health;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::json;

use crate::metrics::AppMetrics;
use crate::repository::FarmRepository;

#[derive(Clone)]
pub struct OpsState {
    pub metrics: Arc<AppMetrics>,
    pub repo: FarmRepository,
}

pub fn ops_router(metrics: Arc<AppMetrics>, repo: FarmRepository) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(render_metrics))
        .route("/notifications/stats", get(notification_stats))
        .with_state(OpsState { metrics, repo })
}

async fn render_metrics(State(state): State<OpsState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            Body::from(body),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "error").into_response()
        }
    }
}

async fn notification_stats(State(state): State<OpsState>) -> Response {
    match state.repo.notification_stats(Utc::now()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => {
            tracing::error!("Error getting notification stats: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to load notification stats" })),
            )
                .into_response()
        }
    }
}

/// Serve [`ops_router`] on `addr` until the process exits.
pub async fn serve(
    addr: std::net::SocketAddr,
    metrics: Arc<AppMetrics>,
    repo: FarmRepository,
) -> Result<(), crate::error::AppError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Ops endpoint listening on {}", addr);
    axum::serve(listener, ops_router(metrics, repo)).await?;
    Ok(())
}
