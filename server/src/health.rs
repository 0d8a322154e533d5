use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use skyroom_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::state::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let redis_check = match state.redis.ping().await {
        Ok(()) => HealthCheck {
            name: "redis".into(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => HealthCheck {
            name: "redis".into(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
    };

    let worker_count = state.worker_pool.worker_count();
    let workers_check = HealthCheck {
        name: "media_workers".into(),
        status: if worker_count > 0 { HealthStatus::Healthy } else { HealthStatus::Unhealthy },
        message: Some(format!("{worker_count} live workers")),
    };

    Json(
        HealthResponse::healthy("skyroom-server", env!("CARGO_PKG_VERSION"))
            .with_checks(vec![redis_check, workers_check]),
    )
}
