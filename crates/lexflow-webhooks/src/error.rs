//! Webhook subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("webhook job payload malformed: {0}")]
    MalformedJob(#[source] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] lexflow_queue::QueueError),

    #[error(transparent)]
    Db(#[from] lexflow_db::DbError),
}
