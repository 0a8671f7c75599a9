//! Route table and middleware stack.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::handlers::{admin, demographics, documents, health, queues};
use crate::middleware::{
    auth_middleware, authorize_middleware, correlation_middleware, idempotency_middleware,
    rate_limit_middleware, validation_middleware,
};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the `/v1` router.
///
/// Layer order on protected routes (outermost first): correlation →
/// authentication → scope authorization → rate limit → validation →
/// idempotency → handler. Validation sits before idempotency so a
/// rejected request never claims its idempotency key. `/health` is
/// anonymous and only gets the correlation id.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/openapi.json", get(serve_openapi));

    let protected = Router::new()
        .route(
            "/demographics",
            get(demographics::list).post(demographics::create),
        )
        .route("/demographics/batch", post(demographics::create_batch))
        .route(
            "/demographics/:id",
            get(demographics::get_one)
                .put(demographics::update)
                .delete(demographics::delete_one),
        )
        .route("/documents/upload-url", post(documents::upload_url))
        .route(
            "/documents/batch-upload-urls",
            post(documents::batch_upload_urls),
        )
        .route("/documents/:correlation_id/status", get(documents::status))
        .route("/admin/api-keys", post(admin::create_api_key))
        .route("/queues", get(queues::queue_depths))
        .layer(from_fn_with_state(state.clone(), idempotency_middleware))
        .layer(from_fn(validation_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn(authorize_middleware))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/v1", public.merge(protected))
        .layer(from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
