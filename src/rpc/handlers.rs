use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ping::PingService;
use super::types::ProcessId;
use crate::error::HoldError;

/// Ping endpoint: `GET /ping/:process_id`.
pub const ENDPOINT_PING: &str = "/ping/:process_id";

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    /// Round trip in milliseconds; absent when the ping failed.
    pub duration_ms: Option<f64>,
    pub error: Option<String>,
}

pub async fn handle_ping(
    Extension(service): Extension<Arc<PingService>>,
    Path(process_id): Path<String>,
) -> (StatusCode, Json<PingResponse>) {
    let peer: ProcessId = match process_id.parse() {
        Ok(peer) => peer,
        Err(e) => {
            tracing::error!("Invalid process id '{}': {}", process_id, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(PingResponse {
                    duration_ms: None,
                    error: Some(e.to_string()),
                }),
            );
        }
    };

    match service.ping(&peer).await {
        Ok(duration) => (
            StatusCode::OK,
            Json(PingResponse {
                duration_ms: Some(duration.as_secs_f64() * 1000.0),
                error: None,
            }),
        ),
        Err(e) => {
            let status = match e {
                HoldError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!("Ping to {} failed: {}", peer, e);
            (
                status,
                Json(PingResponse {
                    duration_ms: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
