//! Health endpoint (C10).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use utoipa::ToSchema;

use crate::state::AppState;

/// Soft probe thresholds. Exceeding one marks the component degraded;
/// an error marks it unhealthy.
const DB_SOFT_THRESHOLD: Duration = Duration::from_secs(5);
const QUEUE_SOFT_THRESHOLD: Duration = Duration::from_secs(3);
const RATE_LIMIT_SOFT_THRESHOLD: Duration = Duration::from_secs(2);

/// Resident-memory thresholds in MB.
const MEMORY_DEGRADED_MB: u64 = 400;
const MEMORY_UNHEALTHY_MB: u64 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: HealthState,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthState,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HashMap<String, ComponentHealth>,
    pub timestamp: DateTime<Utc>,
}

/// Overall status with component breakdown. 200 for healthy/degraded,
/// 503 for unhealthy.
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Healthy or degraded", body = HealthResponse),
        (status = 503, description = "Unhealthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut components = HashMap::new();

    components.insert("database".to_string(), check_database(&state).await);
    components.insert("queue".to_string(), check_queue(&state).await);
    components.insert("rate_limiter".to_string(), check_rate_limiter(&state).await);
    components.insert("memory".to_string(), check_memory());

    let status = components
        .values()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthState::Healthy);

    let http_status = match status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            version: state.version.to_string(),
            uptime_seconds: state.uptime_seconds(),
            components,
            timestamp: Utc::now(),
        }),
    )
}

async fn check_database(state: &AppState) -> ComponentHealth {
    let start = std::time::Instant::now();
    let probe = tokio::time::timeout(
        DB_SOFT_THRESHOLD * 2,
        sqlx::query("SELECT 1").fetch_one(&state.db),
    )
    .await;
    let elapsed = start.elapsed();

    match probe {
        Ok(Ok(_)) if elapsed <= DB_SOFT_THRESHOLD => healthy(elapsed),
        Ok(Ok(_)) => degraded(elapsed, "probe exceeded soft threshold"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Database health probe failed");
            unhealthy(elapsed, "database probe failed")
        }
        Err(_) => degraded(elapsed, "probe exceeded soft threshold"),
    }
}

async fn check_queue(state: &AppState) -> ComponentHealth {
    let start = std::time::Instant::now();
    let probe = tokio::time::timeout(QUEUE_SOFT_THRESHOLD * 2, state.queue_stats.ping()).await;
    let elapsed = start.elapsed();

    match probe {
        Ok(Ok(())) if elapsed <= QUEUE_SOFT_THRESHOLD => healthy(elapsed),
        Ok(Ok(())) => degraded(elapsed, "probe exceeded soft threshold"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Queue health probe failed");
            unhealthy(elapsed, "queue probe failed")
        }
        Err(_) => degraded(elapsed, "probe exceeded soft threshold"),
    }
}

async fn check_rate_limiter(state: &AppState) -> ComponentHealth {
    // Fail-open mode is degraded by definition, whatever the probe says.
    if state.limiter.is_degraded() {
        return ComponentHealth {
            status: HealthState::Degraded,
            latency_ms: 0,
            error: Some("failing open: counter store unavailable".to_string()),
        };
    }

    let start = std::time::Instant::now();
    let probe = tokio::time::timeout(RATE_LIMIT_SOFT_THRESHOLD * 2, state.limiter.probe()).await;
    let elapsed = start.elapsed();

    match probe {
        Ok(Ok(())) if elapsed <= RATE_LIMIT_SOFT_THRESHOLD => healthy(elapsed),
        Ok(Ok(())) => degraded(elapsed, "probe exceeded soft threshold"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Rate-limit store probe failed");
            unhealthy(elapsed, "rate-limit store probe failed")
        }
        Err(_) => degraded(elapsed, "probe exceeded soft threshold"),
    }
}

fn check_memory() -> ComponentHealth {
    match lexflow_workers::resident_memory_mb() {
        Some(mb) if mb > MEMORY_UNHEALTHY_MB => ComponentHealth {
            status: HealthState::Unhealthy,
            latency_ms: 0,
            error: Some(format!("resident memory {mb} MB")),
        },
        Some(mb) if mb > MEMORY_DEGRADED_MB => ComponentHealth {
            status: HealthState::Degraded,
            latency_ms: 0,
            error: Some(format!("resident memory {mb} MB")),
        },
        _ => ComponentHealth {
            status: HealthState::Healthy,
            latency_ms: 0,
            error: None,
        },
    }
}

fn healthy(elapsed: Duration) -> ComponentHealth {
    ComponentHealth {
        status: HealthState::Healthy,
        latency_ms: elapsed.as_millis() as u64,
        error: None,
    }
}

fn degraded(elapsed: Duration, error: &str) -> ComponentHealth {
    ComponentHealth {
        status: HealthState::Degraded,
        latency_ms: elapsed.as_millis() as u64,
        error: Some(error.to_string()),
    }
}

fn unhealthy(elapsed: Duration, error: &str) -> ComponentHealth {
    ComponentHealth {
        status: HealthState::Unhealthy,
        latency_ms: elapsed.as_millis() as u64,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_status_is_the_worst_component() {
        assert!(HealthState::Unhealthy > HealthState::Degraded);
        assert!(HealthState::Degraded > HealthState::Healthy);
        let components = [
            HealthState::Healthy,
            HealthState::Degraded,
            HealthState::Healthy,
        ];
        assert_eq!(
            components.iter().copied().max().unwrap(),
            HealthState::Degraded
        );
    }

    #[test]
    fn states_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthState::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }
}
