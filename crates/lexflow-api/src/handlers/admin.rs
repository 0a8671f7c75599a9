//! Credential issuance (admin surface).

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use lexflow_auth::{generate_key, TenantContext};
use lexflow_core::Scope;
use lexflow_db::models::{ApiCredential, NewApiCredential};
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::{parse_body, validate_request};
use crate::models::{CreateApiKeyRequest, CreateApiKeyResponse};
use crate::state::AppState;
use crate::validation::FieldError;

/// Issue a credential for the authenticated tenant. The plaintext key
/// appears in this response and nowhere else, ever.
#[utoipa::path(
    post,
    path = "/v1/admin/api-keys",
    tag = "Admin",
    responses(
        (status = 201, description = "Credential issued", body = CreateApiKeyResponse),
        (status = 400, description = "Validation failed"),
    )
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), ApiError> {
    let request: CreateApiKeyRequest = parse_body(&body)?;
    validate_request(&request, &body)?;

    // Every requested scope must parse; unknown names are rejected here
    // rather than silently dropped at resolution time.
    let mut scopes = Vec::with_capacity(request.scopes.len());
    for raw in &request.scopes {
        match raw.parse::<Scope>() {
            Ok(scope) => scopes.push(scope.as_str().to_string()),
            Err(_) => {
                return Err(ApiError::Validation(vec![FieldError {
                    field: "scopes".to_string(),
                    message: format!("unknown scope: {raw}"),
                }]));
            }
        }
    }
    scopes.dedup();

    let material = generate_key(state.resolver.prefix());
    let expires_at = request
        .expires_in_days
        .map(|days| Utc::now() + Duration::days(days));

    let credential = ApiCredential::create(
        &state.db,
        NewApiCredential {
            tenant: context.tenant.as_str().to_string(),
            name: request.name,
            key_prefix: material.prefix,
            key_hash: material.hash,
            scopes,
            allowed_ips: request.allowed_ips,
            rate_limits: request.rate_limits.unwrap_or_default(),
            expires_at,
            created_by: Some(context.principal.clone()),
        },
    )
    .await?;

    tracing::info!(
        target: "security",
        tenant = %context.tenant,
        credential_id = %credential.id,
        name = %credential.name,
        "API credential issued"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key: credential,
            key: material.plaintext,
        }),
    ))
}
