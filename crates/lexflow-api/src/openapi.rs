//! OpenAPI document for the `/v1` surface.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "lexflow ingestion API",
        description = "Multi-tenant ingestion and asynchronous processing \
                       plane for legal-claims demographics and settlement data."
    ),
    paths(
        crate::handlers::demographics::create,
        crate::handlers::demographics::create_batch,
        crate::handlers::demographics::list,
        crate::handlers::demographics::get_one,
        crate::handlers::demographics::update,
        crate::handlers::demographics::delete_one,
        crate::handlers::documents::upload_url,
        crate::handlers::documents::batch_upload_urls,
        crate::handlers::documents::status,
        crate::handlers::admin::create_api_key,
        crate::handlers::health::health_handler,
        crate::handlers::queues::queue_depths,
    ),
    components(schemas(
        crate::models::CreateDemographicRequest,
        crate::models::CreateDemographicResponse,
        crate::models::ClaimantType,
        crate::models::BatchOptions,
        crate::models::BatchCreateRequest,
        crate::models::BatchCreateResponse,
        crate::models::BatchItemResult,
        crate::models::BatchMetadata,
        crate::models::Pagination,
        crate::models::BatchUploadItemResult,
        crate::models::ListDemographicsResponse,
        crate::models::GetDemographicResponse,
        crate::models::UpdateDemographicResponse,
        crate::models::DeleteDemographicResponse,
        crate::models::UploadUrlRequest,
        crate::models::UploadUrlResponse,
        crate::models::DocumentStatusResponse,
        crate::models::CreateApiKeyRequest,
        crate::models::CreateApiKeyResponse,
        crate::handlers::health::HealthResponse,
        crate::handlers::health::ComponentHealth,
        crate::handlers::health::HealthState,
        crate::handlers::queues::QueueDepthsResponse,
        crate::error::ErrorBody,
        crate::validation::FieldError,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_builds_and_lists_the_surface() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["paths"]["/v1/demographics"].is_object());
        assert!(json["paths"]["/v1/health"].is_object());
    }
}
