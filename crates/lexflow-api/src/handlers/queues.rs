//! Queue depth telemetry (C10).

use axum::extract::State;
use axum::Json;
use lexflow_queue::{Topic, TopicDepths};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueDepthsResponse {
    /// Keyed by topic name.
    #[schema(value_type = Object)]
    pub topics: BTreeMap<String, TopicDepths>,
}

/// Active, scheduled, and dead-letter counts per topic.
#[utoipa::path(
    get,
    path = "/v1/queues",
    tag = "Health",
    responses((status = 200, description = "Per-topic depths", body = QueueDepthsResponse))
)]
pub async fn queue_depths(
    State(state): State<AppState>,
) -> Result<Json<QueueDepthsResponse>, ApiError> {
    let mut topics = BTreeMap::new();
    for topic in Topic::ALL {
        let depths = state
            .queue_stats
            .depths(topic)
            .await
            .map_err(|e| ApiError::Unavailable(format!("queue stats unavailable: {e}")))?;
        topics.insert(topic.as_str().to_string(), depths);
    }

    Ok(Json(QueueDepthsResponse { topics }))
}
